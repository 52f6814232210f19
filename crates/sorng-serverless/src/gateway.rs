//! REST API lifecycle in API Gateway and the invoke grant that wires an API
//! to its backing function.

use crate::apigateway::{Deployment, GatewayApi, RestApi};
use crate::config::AwsRegion;
use crate::error::{ServerlessError, ServerlessResult};
use crate::lambda::ComputeApi;
use crate::permissions;
use std::sync::Arc;

pub struct GatewayManager {
    gateway: Arc<dyn GatewayApi>,
    region: AwsRegion,
}

impl GatewayManager {
    pub fn new(gateway: Arc<dyn GatewayApi>, region: AwsRegion) -> Self {
        Self { gateway, region }
    }

    /// Id of the first API called `name`, scanning every page in order.
    pub async fn get_rest_api_id(&self, name: &str) -> ServerlessResult<Option<String>> {
        let mut position: Option<String> = None;
        loop {
            let page = self.gateway.get_rest_apis(position.as_deref()).await?;
            if let Some(api) = page.items.into_iter().find(|api| api.name == name) {
                return Ok(Some(api.id));
            }
            match page.position {
                Some(next) => position = Some(next),
                None => return Ok(None),
            }
        }
    }

    pub async fn rest_api_exists(&self, rest_api_id: &str) -> ServerlessResult<bool> {
        match self.gateway.get_rest_api(rest_api_id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create an API from an OpenAPI document and return its id.
    pub async fn import_definition(&self, definition: &serde_json::Value) -> ServerlessResult<String> {
        let api: RestApi = self.gateway.import_rest_api(definition).await?;
        log::info!("Imported REST API {} ({})", api.name, api.id);
        Ok(api.id)
    }

    pub async fn update_definition(&self, rest_api_id: &str, definition: &serde_json::Value) -> ServerlessResult<()> {
        self.gateway.put_rest_api(rest_api_id, definition).await?;
        log::info!("Replaced definition of REST API {}", rest_api_id);
        Ok(())
    }

    pub async fn delete(&self, rest_api_id: &str) -> ServerlessResult<()> {
        match self.gateway.delete_rest_api(rest_api_id).await {
            Ok(()) => {
                log::info!("Deleted REST API {}", rest_api_id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(ServerlessError::ResourceDoesNotExist(rest_api_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Every call creates a new deployment of the current definition.
    pub async fn deploy(&self, rest_api_id: &str, stage_name: &str) -> ServerlessResult<Deployment> {
        log::debug!("Deploying REST API {} to stage {}", rest_api_id, stage_name);
        let deployment = self.gateway.create_deployment(rest_api_id, stage_name).await?;
        log::info!("Deployed REST API {} to {} ({})", rest_api_id, stage_name, deployment.id);
        Ok(deployment)
    }

    fn source_arn(&self, account_id: &str, rest_api_id: &str) -> String {
        permissions::execute_api_source_arn(self.region.partition(), &self.region.name, account_id, rest_api_id)
    }

    /// Allow the API to invoke `function_name` unless a matching grant is
    /// already present. Returns whether a grant was added.
    pub async fn grant_invoke_if_needed(
        &self,
        compute: &dyn ComputeApi,
        function_name: &str,
        account_id: &str,
        rest_api_id: &str,
    ) -> ServerlessResult<bool> {
        let source_arn = self.source_arn(account_id, rest_api_id);
        permissions::grant_if_needed(compute, function_name, &source_arn).await
    }

    /// Allow the API to invoke `function_name` without checking existing
    /// grants.
    pub async fn add_permission_for_apigateway(
        &self,
        compute: &dyn ComputeApi,
        function_name: &str,
        account_id: &str,
        rest_api_id: &str,
    ) -> ServerlessResult<()> {
        let source_arn = self.source_arn(account_id, rest_api_id);
        permissions::add_permission_for_apigateway(compute, function_name, &source_arn).await?;
        Ok(())
    }
}
