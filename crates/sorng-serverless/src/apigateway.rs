//! Amazon API Gateway (REST APIs, v1): the gateway capability.
//!
//! REST+JSON with camelCase payloads. API definitions are sent verbatim as
//! OpenAPI JSON documents.

use crate::client::{AwsClient, ByteStream};
use crate::error::AwsResult;
use crate::signing::uri_encode;
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "apigateway";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RestApi {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Epoch seconds as reported by the service.
    pub created_date: Option<f64>,
}

/// One page of `GetRestApis`; `position` is set while more pages remain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestApiPage {
    #[serde(rename = "item")]
    pub items: Vec<RestApi>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub id: String,
    pub description: Option<String>,
    pub created_date: Option<f64>,
}

#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn get_rest_apis(&self, position: Option<&str>) -> AwsResult<RestApiPage>;

    async fn get_rest_api(&self, rest_api_id: &str) -> AwsResult<RestApi>;

    async fn import_rest_api(&self, definition: &serde_json::Value) -> AwsResult<RestApi>;

    /// Replace the whole definition (`mode=overwrite`).
    async fn put_rest_api(&self, rest_api_id: &str, definition: &serde_json::Value) -> AwsResult<RestApi>;

    async fn delete_rest_api(&self, rest_api_id: &str) -> AwsResult<()>;

    async fn create_deployment(&self, rest_api_id: &str, stage_name: &str) -> AwsResult<Deployment>;

    /// Generated client SDK as a zip byte stream.
    async fn get_sdk(&self, rest_api_id: &str, stage_name: &str, sdk_type: &str) -> AwsResult<ByteStream>;
}

pub struct ApiGatewayClient {
    client: AwsClient,
}

impl ApiGatewayClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    fn api_path(rest_api_id: &str) -> String {
        format!("/restapis/{}", uri_encode(rest_api_id))
    }

    async fn send_definition(
        &self,
        action: &str,
        method: Method,
        path: &str,
        definition: &serde_json::Value,
    ) -> AwsResult<RestApi> {
        let body = serde_json::to_vec(definition)
            .map_err(|e| crate::error::AwsError::new(SERVICE, "SerializeError", &e.to_string(), 0))?;
        self.client
            .rest_raw(SERVICE, method, path, "application/json", body)
            .await
            .map_err(|e| e.with_action(action))?
            .json(SERVICE)
    }
}

#[async_trait]
impl GatewayApi for ApiGatewayClient {
    async fn get_rest_apis(&self, position: Option<&str>) -> AwsResult<RestApiPage> {
        let path = match position {
            Some(p) => format!("/restapis?limit=500&position={}", uri_encode(p)),
            None => "/restapis?limit=500".to_string(),
        };
        self.client
            .rest_json(SERVICE, Method::GET, &path, None)
            .await
            .map_err(|e| e.with_action("GetRestApis"))?
            .json(SERVICE)
    }

    async fn get_rest_api(&self, rest_api_id: &str) -> AwsResult<RestApi> {
        self.client
            .rest_json(SERVICE, Method::GET, &Self::api_path(rest_api_id), None)
            .await
            .map_err(|e| e.with_action("GetRestApi"))?
            .json(SERVICE)
    }

    async fn import_rest_api(&self, definition: &serde_json::Value) -> AwsResult<RestApi> {
        self.send_definition("ImportRestApi", Method::POST, "/restapis?mode=import", definition)
            .await
    }

    async fn put_rest_api(&self, rest_api_id: &str, definition: &serde_json::Value) -> AwsResult<RestApi> {
        let path = format!("{}?mode=overwrite", Self::api_path(rest_api_id));
        self.send_definition("PutRestApi", Method::PUT, &path, definition)
            .await
    }

    async fn delete_rest_api(&self, rest_api_id: &str) -> AwsResult<()> {
        self.client
            .rest_json(SERVICE, Method::DELETE, &Self::api_path(rest_api_id), None)
            .await
            .map_err(|e| e.with_action("DeleteRestApi"))?;
        Ok(())
    }

    async fn create_deployment(&self, rest_api_id: &str, stage_name: &str) -> AwsResult<Deployment> {
        let path = format!("{}/deployments", Self::api_path(rest_api_id));
        let body = serde_json::json!({ "stageName": stage_name });
        self.client
            .rest_json(SERVICE, Method::POST, &path, Some(&body))
            .await
            .map_err(|e| e.with_action("CreateDeployment"))?
            .json(SERVICE)
    }

    async fn get_sdk(&self, rest_api_id: &str, stage_name: &str, sdk_type: &str) -> AwsResult<ByteStream> {
        let path = format!(
            "{}/stages/{}/sdks/{}",
            Self::api_path(rest_api_id),
            uri_encode(stage_name),
            uri_encode(sdk_type)
        );
        self.client
            .rest_stream(SERVICE, &path, "application/octet-stream")
            .await
            .map_err(|e| e.with_action("GetSdk"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rest_api_page() {
        let json = r#"{"item":[{"id":"abc123","name":"app","createdDate":1700000000,"apiKeySource":"HEADER"}],"position":"next"}"#;
        let page: RestApiPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "abc123");
        assert_eq!(page.position.as_deref(), Some("next"));
        assert_eq!(page.items[0].created_date, Some(1_700_000_000.0));
    }

    #[test]
    fn parse_last_page_without_items() {
        let page: RestApiPage = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.position.is_none());
    }

    #[test]
    fn api_path_is_encoded() {
        assert_eq!(ApiGatewayClient::api_path("abc123"), "/restapis/abc123");
        assert_eq!(ApiGatewayClient::api_path("a/b"), "/restapis/a%2Fb");
    }
}
