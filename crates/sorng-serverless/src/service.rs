//! `ServerlessClient`: the call surface used by a deployer.
//!
//! Owns the connection cache and hands out managers built over the cached
//! handles. Every operation is awaited to completion before the next one is
//! issued; nothing here runs in the background.

use crate::apigateway::Deployment;
use crate::client::ByteStream;
use crate::config::{AwsRegion, CreateRetryPolicy, SdkConfig};
use crate::error::ServerlessResult;
use crate::functions::{FunctionManager, FunctionSpec, FunctionUpdate};
use crate::gateway::GatewayManager;
use crate::lambda::FunctionConfiguration;
use crate::logs::{self, LogEventStream};
use crate::permissions::{self, PolicyDocument};
use crate::registry::{ClientFactory, ConnectionCache};
use crate::roles::{RoleManager, RoleSpec};
use crate::sdk;
use std::path::{Path, PathBuf};

pub struct ServerlessClient {
    cache: ConnectionCache,
    region: AwsRegion,
    create_retry: CreateRetryPolicy,
}

impl ServerlessClient {
    pub fn new(config: SdkConfig) -> Self {
        let region = config.region.clone();
        Self::with_cache(region, ConnectionCache::from_config(config))
    }

    pub fn from_environment() -> Result<Self, String> {
        Ok(Self::new(SdkConfig::from_environment()?))
    }

    pub fn with_cache(region: AwsRegion, cache: ConnectionCache) -> Self {
        Self {
            cache,
            region,
            create_retry: CreateRetryPolicy::default(),
        }
    }

    /// Build over an arbitrary handle factory (alternate endpoints, fakes).
    pub fn from_factory(region: AwsRegion, factory: impl ClientFactory + 'static) -> Self {
        Self::with_cache(region, ConnectionCache::new(factory))
    }

    pub fn with_create_retry(mut self, policy: CreateRetryPolicy) -> Self {
        self.create_retry = policy;
        self
    }

    pub fn region_name(&self) -> &str {
        &self.region.name
    }

    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    pub fn functions(&self) -> FunctionManager {
        FunctionManager::new(self.cache.compute(), self.create_retry)
    }

    pub fn roles(&self) -> RoleManager {
        RoleManager::new(self.cache.identity())
    }

    pub fn gateway(&self) -> GatewayManager {
        GatewayManager::new(self.cache.gateway(), self.region.clone())
    }

    // ── Functions ───────────────────────────────────────────────────

    pub async fn lambda_function_exists(&self, name: &str) -> ServerlessResult<bool> {
        self.functions().exists(name).await
    }

    pub async fn get_function_configuration(&self, name: &str) -> ServerlessResult<FunctionConfiguration> {
        self.functions().get_configuration(name).await
    }

    pub async fn create_function(&self, spec: &FunctionSpec) -> ServerlessResult<String> {
        self.functions().create(spec).await
    }

    pub async fn update_function(
        &self,
        name: &str,
        zip_contents: &[u8],
        update: &FunctionUpdate,
    ) -> ServerlessResult<FunctionConfiguration> {
        self.functions().update(name, zip_contents, update).await
    }

    pub async fn delete_function(&self, name: &str) -> ServerlessResult<()> {
        self.functions().delete(name).await
    }

    pub async fn get_function_policy(&self, name: &str) -> ServerlessResult<PolicyDocument> {
        permissions::get_function_policy(self.cache.compute().as_ref(), name).await
    }

    // ── Roles ───────────────────────────────────────────────────────

    pub async fn get_role_arn_for_name(&self, name: &str) -> ServerlessResult<String> {
        self.roles().get_role_arn_for_name(name).await
    }

    pub async fn create_role(&self, spec: &RoleSpec) -> ServerlessResult<String> {
        self.roles().create_role(spec).await
    }

    pub async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> ServerlessResult<()> {
        self.roles().put_role_policy(role_name, policy_name, document).await
    }

    pub async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> ServerlessResult<()> {
        self.roles().delete_role_policy(role_name, policy_name).await
    }

    pub async fn delete_role(&self, name: &str) -> ServerlessResult<()> {
        self.roles().delete_role(name).await
    }

    // ── REST APIs ───────────────────────────────────────────────────

    pub async fn get_rest_api_id(&self, name: &str) -> ServerlessResult<Option<String>> {
        self.gateway().get_rest_api_id(name).await
    }

    pub async fn rest_api_exists(&self, rest_api_id: &str) -> ServerlessResult<bool> {
        self.gateway().rest_api_exists(rest_api_id).await
    }

    pub async fn import_rest_api(&self, definition: &serde_json::Value) -> ServerlessResult<String> {
        self.gateway().import_definition(definition).await
    }

    pub async fn update_api_from_swagger(
        &self,
        rest_api_id: &str,
        definition: &serde_json::Value,
    ) -> ServerlessResult<()> {
        self.gateway().update_definition(rest_api_id, definition).await
    }

    pub async fn delete_rest_api(&self, rest_api_id: &str) -> ServerlessResult<()> {
        self.gateway().delete(rest_api_id).await
    }

    pub async fn deploy_rest_api(&self, rest_api_id: &str, stage_name: &str) -> ServerlessResult<Deployment> {
        self.gateway().deploy(rest_api_id, stage_name).await
    }

    pub async fn add_permission_for_apigateway(
        &self,
        function_name: &str,
        account_id: &str,
        rest_api_id: &str,
    ) -> ServerlessResult<()> {
        self.gateway()
            .add_permission_for_apigateway(self.cache.compute().as_ref(), function_name, account_id, rest_api_id)
            .await
    }

    pub async fn add_permission_for_apigateway_if_needed(
        &self,
        function_name: &str,
        account_id: &str,
        rest_api_id: &str,
    ) -> ServerlessResult<bool> {
        self.gateway()
            .grant_invoke_if_needed(self.cache.compute().as_ref(), function_name, account_id, rest_api_id)
            .await
    }

    // ── SDKs ────────────────────────────────────────────────────────

    pub async fn get_sdk_download_stream(
        &self,
        rest_api_id: &str,
        stage_name: &str,
        sdk_kind: &str,
    ) -> ServerlessResult<ByteStream> {
        sdk::get_sdk_download_stream(self.cache.gateway().as_ref(), rest_api_id, stage_name, sdk_kind).await
    }

    pub async fn download_sdk(
        &self,
        rest_api_id: &str,
        output_dir: &Path,
        stage_name: &str,
        sdk_kind: &str,
    ) -> ServerlessResult<PathBuf> {
        sdk::fetch_sdk(self.cache.gateway().as_ref(), rest_api_id, stage_name, sdk_kind, output_dir).await
    }

    // ── Logs ────────────────────────────────────────────────────────

    pub fn iter_log_events(&self, log_group_name: &str, interleaved: bool) -> LogEventStream {
        logs::log_event_stream(self.cache.logs(), log_group_name.to_string(), interleaved)
    }
}
