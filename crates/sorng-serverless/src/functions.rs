//! Function lifecycle: existence checks, propagation-aware creation,
//! partial updates and deletion.

use crate::config::CreateRetryPolicy;
use crate::error::{ErrorKind, ServerlessError, ServerlessResult};
use crate::lambda::{
    ComputeApi, CreateFunctionRequest, Environment, FunctionCode, FunctionConfiguration, UpdateConfigurationRequest,
};
use crate::tags::{self, TagSet};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler every deployed function is created with.
pub const DEFAULT_HANDLER: &str = "app.app";

/// Desired state of a function to create.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    pub role_arn: String,
    pub zip_contents: Vec<u8>,
    pub runtime: String,
    pub handler: String,
    pub environment_variables: Option<HashMap<String, String>>,
    pub tags: Option<TagSet>,
    pub timeout: Option<u32>,
    pub memory_size: Option<u32>,
}

impl FunctionSpec {
    pub fn new(name: &str, role_arn: &str, zip_contents: Vec<u8>, runtime: &str) -> Self {
        Self {
            name: name.to_string(),
            role_arn: role_arn.to_string(),
            zip_contents,
            runtime: runtime.to_string(),
            handler: DEFAULT_HANDLER.to_string(),
            environment_variables: None,
            tags: None,
            timeout: None,
            memory_size: None,
        }
    }

    fn to_request(&self) -> CreateFunctionRequest {
        CreateFunctionRequest {
            function_name: self.name.clone(),
            runtime: self.runtime.clone(),
            role: self.role_arn.clone(),
            handler: self.handler.clone(),
            code: FunctionCode::from_zip(&self.zip_contents),
            environment: self.environment_variables.clone().map(|variables| Environment { variables }),
            tags: self.tags.clone(),
            timeout: self.timeout,
            memory_size: self.memory_size,
        }
    }
}

/// Fields to change on an existing function. `None` leaves the remote value
/// alone; `tags: Some(..)` makes the remote tag set match exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionUpdate {
    pub environment_variables: Option<HashMap<String, String>>,
    pub runtime: Option<String>,
    pub tags: Option<TagSet>,
    pub timeout: Option<u32>,
    pub memory_size: Option<u32>,
}

impl FunctionUpdate {
    fn configuration(&self) -> UpdateConfigurationRequest {
        UpdateConfigurationRequest {
            environment: self.environment_variables.clone().map(|variables| Environment { variables }),
            runtime: self.runtime.clone(),
            timeout: self.timeout,
            memory_size: self.memory_size,
        }
    }
}

pub struct FunctionManager {
    compute: Arc<dyn ComputeApi>,
    retry: CreateRetryPolicy,
}

impl FunctionManager {
    pub fn new(compute: Arc<dyn ComputeApi>, retry: CreateRetryPolicy) -> Self {
        Self { compute, retry }
    }

    pub async fn exists(&self, name: &str) -> ServerlessResult<bool> {
        match self.compute.get_function(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_configuration(&self, name: &str) -> ServerlessResult<FunctionConfiguration> {
        Ok(self.compute.get_function_configuration(name).await?)
    }

    /// Create the function and return its ARN.
    ///
    /// A role created moments earlier is not yet assumable by Lambda, which
    /// reports it as an invalid parameter. Those failures are retried on a
    /// fixed delay up to the policy's attempt ceiling; the delay is also
    /// taken after the final failure. Any other failure ends the loop at
    /// once.
    pub async fn create(&self, spec: &FunctionSpec) -> ServerlessResult<String> {
        let request = spec.to_request();
        let mut attempts = 0u32;
        loop {
            let err = match self.compute.create_function(&request).await {
                Ok(created) => {
                    log::info!("Created function {} ({})", spec.name, created.function_arn);
                    return Ok(created.function_arn);
                }
                Err(e) => e,
            };
            if err.kind() != ErrorKind::InvalidParameter {
                return Err(err.into());
            }
            log::warn!(
                "Creating {} failed ({}), retrying in {:?} [{}/{}]",
                spec.name,
                err.message,
                self.retry.delay,
                attempts + 1,
                self.retry.max_attempts
            );
            tokio::time::sleep(self.retry.delay).await;
            attempts += 1;
            if attempts >= self.retry.max_attempts {
                log::error!("Giving up on {} after waiting {:?}", spec.name, self.retry.total_wait());
                return Err(err.into());
            }
        }
    }

    /// Upload new code, then apply only the configuration fields that are
    /// set, then reconcile tags if requested. Returns the update-code result.
    pub async fn update(
        &self,
        name: &str,
        zip_contents: &[u8],
        update: &FunctionUpdate,
    ) -> ServerlessResult<FunctionConfiguration> {
        log::debug!("Uploading {} bytes of code to {}", zip_contents.len(), name);
        let updated = self.compute.update_function_code(name, zip_contents).await?;

        let configuration = update.configuration();
        if !configuration.is_empty() {
            log::debug!("Updating configuration of {}", name);
            self.compute.update_function_configuration(name, &configuration).await?;
        }
        if let Some(ref desired) = update.tags {
            tags::apply(self.compute.as_ref(), &updated.function_arn, desired).await?;
        }
        log::info!("Updated function {}", name);
        Ok(updated)
    }

    pub async fn delete(&self, name: &str) -> ServerlessResult<()> {
        match self.compute.delete_function(name).await {
            Ok(()) => {
                log::info!("Deleted function {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Err(ServerlessError::ResourceDoesNotExist(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
