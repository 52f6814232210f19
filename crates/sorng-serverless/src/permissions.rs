//! Idempotent invoke grants for API Gateway.
//!
//! `AddPermission` appends a statement every time it is called, so a grant is
//! only issued after the function's resource policy has been checked for an
//! equivalent statement.

use crate::error::{AwsResult, ServerlessResult};
use crate::lambda::{AddPermissionRequest, ComputeApi, INVOKE_ACTION};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const APIGATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Option<String>,
    pub action: Option<Value>,
    pub principal: Option<Value>,
    pub condition: Option<Value>,
    pub resource: Option<Value>,
}

impl PolicyStatement {
    /// True when this statement lets API Gateway invoke the function from
    /// `source_arn`. The resource is not inspected; the policy was fetched
    /// for the function in question.
    pub fn grants_invoke_from(&self, source_arn: &str) -> bool {
        let action = self.action.as_ref().and_then(Value::as_str);
        let condition_arn = self
            .condition
            .as_ref()
            .and_then(|c| c.pointer("/ArnLike/AWS:SourceArn"))
            .and_then(Value::as_str);
        let service = self
            .principal
            .as_ref()
            .and_then(|p| p.get("Service"))
            .and_then(Value::as_str);
        action == Some(INVOKE_ACTION) && condition_arn == Some(source_arn) && service == Some(APIGATEWAY_PRINCIPAL)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PolicyDocument {
    pub version: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "Statement")]
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn parse(raw: &str) -> ServerlessResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

pub fn already_granted(policy: &PolicyDocument, source_arn: &str) -> bool {
    policy.statements.iter().any(|s| s.grants_invoke_from(source_arn))
}

/// `arn:<partition>:execute-api:<region>:<account>:<api-id>/*`
pub fn execute_api_source_arn(partition: &str, region: &str, account_id: &str, rest_api_id: &str) -> String {
    format!("arn:{}:execute-api:{}:{}:{}/*", partition, region, account_id, rest_api_id)
}

/// The function's resource policy. A function without one has an empty
/// policy.
pub async fn get_function_policy(compute: &dyn ComputeApi, function_name: &str) -> ServerlessResult<PolicyDocument> {
    match compute.get_policy(function_name).await {
        Ok(raw) => PolicyDocument::parse(&raw),
        Err(e) if e.is_not_found() => Ok(PolicyDocument::default()),
        Err(e) => Err(e.into()),
    }
}

/// Grant API Gateway invoke access unconditionally, with a fresh statement id.
pub async fn add_permission_for_apigateway(
    compute: &dyn ComputeApi,
    function_name: &str,
    source_arn: &str,
) -> AwsResult<()> {
    let request = AddPermissionRequest {
        statement_id: uuid::Uuid::new_v4().to_string(),
        action: INVOKE_ACTION.to_string(),
        principal: APIGATEWAY_PRINCIPAL.to_string(),
        source_arn: Some(source_arn.to_string()),
    };
    log::debug!("Adding invoke permission on {} for {}", function_name, source_arn);
    compute.add_permission(function_name, &request).await
}

/// Returns whether a new grant was issued.
pub async fn grant_if_needed(
    compute: &dyn ComputeApi,
    function_name: &str,
    source_arn: &str,
) -> ServerlessResult<bool> {
    let policy = get_function_policy(compute, function_name).await?;
    if already_granted(&policy, source_arn) {
        log::info!("API Gateway can already invoke {} from {}", function_name, source_arn);
        return Ok(false);
    }
    add_permission_for_apigateway(compute, function_name, source_arn).await?;
    Ok(true)
}
