//! AWS Lambda: the compute capability.
//!
//! Lambda uses the REST+JSON protocol.
//!
//! Reference: <https://docs.aws.amazon.com/lambda/latest/api/>

use crate::client::AwsClient;
use crate::error::{AwsError, AwsResult};
use crate::signing::uri_encode;
use crate::tags::TagSet;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const SERVICE: &str = "lambda";

/// Action granted to API Gateway on a function.
pub const INVOKE_ACTION: &str = "lambda:InvokeFunction";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: String,
    pub runtime: Option<String>,
    pub role: Option<String>,
    pub handler: Option<String>,
    pub timeout: Option<u32>,
    pub memory_size: Option<u32>,
    pub last_modified: Option<String>,
    pub version: Option<String>,
    pub environment: Option<Environment>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Environment {
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionCode {
    /// Base64 encoded deployment package.
    pub zip_file: String,
}

impl FunctionCode {
    pub fn from_zip(bytes: &[u8]) -> Self {
        Self {
            zip_file: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Body of `CreateFunction`. Absent optionals are left out of the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub runtime: String,
    pub role: String,
    pub handler: String,
    pub code: FunctionCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
}

/// Body of `UpdateFunctionConfiguration`. Only present fields are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateConfigurationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,
}

impl UpdateConfigurationRequest {
    pub fn is_empty(&self) -> bool {
        self.environment.is_none() && self.runtime.is_none() && self.timeout.is_none() && self.memory_size.is_none()
    }
}

/// Body of `AddPermission`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AddPermissionRequest {
    pub statement_id: String,
    pub action: String,
    pub principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_arn: Option<String>,
}

// ── Capability ──────────────────────────────────────────────────────────

/// Compute control-plane calls used by the function manager and the
/// permission checker.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_function(&self, name: &str) -> AwsResult<FunctionConfiguration>;

    async fn get_function_configuration(&self, name: &str) -> AwsResult<FunctionConfiguration>;

    async fn create_function(&self, request: &CreateFunctionRequest) -> AwsResult<FunctionConfiguration>;

    async fn update_function_code(&self, name: &str, zip_contents: &[u8]) -> AwsResult<FunctionConfiguration>;

    async fn update_function_configuration(
        &self,
        name: &str,
        request: &UpdateConfigurationRequest,
    ) -> AwsResult<FunctionConfiguration>;

    async fn delete_function(&self, name: &str) -> AwsResult<()>;

    async fn list_tags(&self, arn: &str) -> AwsResult<TagSet>;

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> AwsResult<()>;

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> AwsResult<()>;

    /// The function's resource policy as the raw JSON document string.
    async fn get_policy(&self, name: &str) -> AwsResult<String>;

    async fn add_permission(&self, name: &str, request: &AddPermissionRequest) -> AwsResult<()>;
}

// ── Lambda Client ───────────────────────────────────────────────────────

pub struct LambdaClient {
    client: AwsClient,
}

impl LambdaClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    fn function_path(name: &str, suffix: &str) -> String {
        format!("/2015-03-31/functions/{}{}", uri_encode(name), suffix)
    }

    fn tags_path(arn: &str) -> String {
        format!("/2017-03-31/tags/{}", uri_encode(arn))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> AwsResult<T> {
        let response = self
            .client
            .rest_json(SERVICE, method, path, body)
            .await
            .map_err(|e| e.with_action(action))?;
        response.json(SERVICE)
    }
}

fn to_body<T: Serialize>(value: &T) -> AwsResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AwsError::new(SERVICE, "SerializeError", &e.to_string(), 0))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetFunctionOutput {
    configuration: FunctionConfiguration,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListTagsOutput {
    #[serde(default)]
    tags: TagSet,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetPolicyOutput {
    policy: String,
}

#[async_trait]
impl ComputeApi for LambdaClient {
    async fn get_function(&self, name: &str) -> AwsResult<FunctionConfiguration> {
        let out: GetFunctionOutput = self
            .call("GetFunction", Method::GET, &Self::function_path(name, ""), None)
            .await?;
        Ok(out.configuration)
    }

    async fn get_function_configuration(&self, name: &str) -> AwsResult<FunctionConfiguration> {
        self.call(
            "GetFunctionConfiguration",
            Method::GET,
            &Self::function_path(name, "/configuration"),
            None,
        )
        .await
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> AwsResult<FunctionConfiguration> {
        let body = to_body(request)?;
        self.call("CreateFunction", Method::POST, "/2015-03-31/functions", Some(&body))
            .await
    }

    async fn update_function_code(&self, name: &str, zip_contents: &[u8]) -> AwsResult<FunctionConfiguration> {
        let body = to_body(&FunctionCode::from_zip(zip_contents))?;
        self.call(
            "UpdateFunctionCode",
            Method::PUT,
            &Self::function_path(name, "/code"),
            Some(&body),
        )
        .await
    }

    async fn update_function_configuration(
        &self,
        name: &str,
        request: &UpdateConfigurationRequest,
    ) -> AwsResult<FunctionConfiguration> {
        let body = to_body(request)?;
        self.call(
            "UpdateFunctionConfiguration",
            Method::PUT,
            &Self::function_path(name, "/configuration"),
            Some(&body),
        )
        .await
    }

    async fn delete_function(&self, name: &str) -> AwsResult<()> {
        self.client
            .rest_json(SERVICE, Method::DELETE, &Self::function_path(name, ""), None)
            .await
            .map_err(|e| e.with_action("DeleteFunction"))?;
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> AwsResult<TagSet> {
        let out: ListTagsOutput = self
            .call("ListTags", Method::GET, &Self::tags_path(arn), None)
            .await?;
        Ok(out.tags)
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> AwsResult<()> {
        let body = serde_json::json!({ "Tags": tags });
        self.client
            .rest_json(SERVICE, Method::POST, &Self::tags_path(arn), Some(&body))
            .await
            .map_err(|e| e.with_action("TagResource"))?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> AwsResult<()> {
        let query = keys
            .iter()
            .map(|k| format!("tagKeys={}", uri_encode(k)))
            .collect::<Vec<_>>()
            .join("&");
        let path = format!("{}?{}", Self::tags_path(arn), query);
        self.client
            .rest_json(SERVICE, Method::DELETE, &path, None)
            .await
            .map_err(|e| e.with_action("UntagResource"))?;
        Ok(())
    }

    async fn get_policy(&self, name: &str) -> AwsResult<String> {
        let out: GetPolicyOutput = self
            .call("GetPolicy", Method::GET, &Self::function_path(name, "/policy"), None)
            .await?;
        Ok(out.policy)
    }

    async fn add_permission(&self, name: &str, request: &AddPermissionRequest) -> AwsResult<()> {
        let body = to_body(request)?;
        self.client
            .rest_json(SERVICE, Method::POST, &Self::function_path(name, "/policy"), Some(&body))
            .await
            .map_err(|e| e.with_action("AddPermission"))?;
        Ok(())
    }
}
