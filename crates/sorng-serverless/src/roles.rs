//! Execution roles: one trust policy plus one inline policy named after the
//! role.

use crate::error::{ServerlessError, ServerlessResult};
use crate::iam::IdentityApi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleSpec {
    pub name: String,
    pub trust_policy: serde_json::Value,
    pub inline_policy: serde_json::Value,
}

pub struct RoleManager {
    identity: Arc<dyn IdentityApi>,
}

impl RoleManager {
    pub fn new(identity: Arc<dyn IdentityApi>) -> Self {
        Self { identity }
    }

    pub async fn get_role_arn_for_name(&self, name: &str) -> ServerlessResult<String> {
        match self.identity.get_role(name).await {
            Ok(role) => Ok(role.arn),
            Err(e) if e.is_not_found() => Err(ServerlessError::ResourceDoesNotExist(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the role, attach its inline policy and return the role ARN.
    pub async fn create_role(&self, spec: &RoleSpec) -> ServerlessResult<String> {
        let trust = serde_json::to_string(&spec.trust_policy)?;
        log::debug!("Creating role {}", spec.name);
        let role = self.identity.create_role(&spec.name, &trust).await?;
        self.put_role_policy(&spec.name, &spec.name, &spec.inline_policy)
            .await?;
        log::info!("Created role {} ({})", spec.name, role.arn);
        Ok(role.arn)
    }

    pub async fn put_role_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &serde_json::Value,
    ) -> ServerlessResult<()> {
        let document = serde_json::to_string_pretty(document)?;
        log::debug!("Putting policy {} on role {}", policy_name, role_name);
        self.identity
            .put_role_policy(role_name, policy_name, &document)
            .await?;
        Ok(())
    }

    pub async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> ServerlessResult<()> {
        log::debug!("Deleting policy {} from role {}", policy_name, role_name);
        self.identity.delete_role_policy(role_name, policy_name).await?;
        Ok(())
    }

    /// Delete every inline policy (across all pages), then the role. IAM
    /// refuses to delete a role that still has policies.
    pub async fn delete_role(&self, name: &str) -> ServerlessResult<()> {
        let mut policy_names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.identity.list_role_policies(name, marker.as_deref()).await?;
            policy_names.extend(page.policy_names);
            match page.marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        for policy_name in &policy_names {
            self.delete_role_policy(name, policy_name).await?;
        }
        self.identity.delete_role(name).await?;
        log::info!("Deleted role {} and {} inline policies", name, policy_names.len());
        Ok(())
    }
}
