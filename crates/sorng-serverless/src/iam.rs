//! AWS Identity and Access Management: the identity capability.
//!
//! IAM is global and uses the Query protocol with XML responses.

use crate::client::{self, AwsClient};
use crate::error::{AwsError, AwsResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "iam";
const API_VERSION: &str = "2010-05-08";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Role {
    pub role_name: String,
    pub role_id: String,
    pub arn: String,
    pub path: String,
    pub create_date: Option<String>,
}

/// One page of `ListRolePolicies`. `marker` is set while more pages remain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolePolicyPage {
    pub policy_names: Vec<String>,
    pub marker: Option<String>,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_role(&self, role_name: &str, trust_policy: &str) -> AwsResult<Role>;

    async fn get_role(&self, role_name: &str) -> AwsResult<Role>;

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()>;

    async fn list_role_policies(&self, role_name: &str, marker: Option<&str>) -> AwsResult<RolePolicyPage>;

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()>;

    async fn delete_role(&self, role_name: &str) -> AwsResult<()>;
}

pub struct IamClient {
    client: AwsClient,
}

impl IamClient {
    pub fn new(client: AwsClient) -> Self {
        Self { client }
    }

    async fn call(&self, action: &str, extra: &[(&str, &str)]) -> AwsResult<String> {
        let mut params = client::query_params(action, API_VERSION);
        for (k, v) in extra {
            params.insert(k.to_string(), v.to_string());
        }
        let response = self
            .client
            .query(SERVICE, &params)
            .await
            .map_err(|e| e.with_action(action))?;
        Ok(response.text())
    }
}

fn parse_role(xml: &str, action: &str) -> AwsResult<Role> {
    let block = client::xml_block(xml, "Role")
        .ok_or_else(|| AwsError::parse(SERVICE, &format!("No Role in {} response", action)))?;
    Ok(Role {
        role_name: client::xml_text(block, "RoleName").unwrap_or_default(),
        role_id: client::xml_text(block, "RoleId").unwrap_or_default(),
        arn: client::xml_text(block, "Arn").unwrap_or_default(),
        path: client::xml_text(block, "Path").unwrap_or_else(|| "/".to_string()),
        create_date: client::xml_text(block, "CreateDate"),
    })
}

fn parse_policy_page(xml: &str) -> RolePolicyPage {
    let names = client::xml_block(xml, "PolicyNames")
        .map(|block| client::xml_text_all(block, "member"))
        .unwrap_or_default();
    let truncated = client::xml_text(xml, "IsTruncated").as_deref() == Some("true");
    RolePolicyPage {
        policy_names: names,
        marker: if truncated { client::xml_text(xml, "Marker") } else { None },
    }
}

#[async_trait]
impl IdentityApi for IamClient {
    async fn create_role(&self, role_name: &str, trust_policy: &str) -> AwsResult<Role> {
        let xml = self
            .call(
                "CreateRole",
                &[("RoleName", role_name), ("AssumeRolePolicyDocument", trust_policy)],
            )
            .await?;
        parse_role(&xml, "CreateRole")
    }

    async fn get_role(&self, role_name: &str) -> AwsResult<Role> {
        let xml = self.call("GetRole", &[("RoleName", role_name)]).await?;
        parse_role(&xml, "GetRole")
    }

    async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> AwsResult<()> {
        self.call(
            "PutRolePolicy",
            &[
                ("RoleName", role_name),
                ("PolicyName", policy_name),
                ("PolicyDocument", document),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_role_policies(&self, role_name: &str, marker: Option<&str>) -> AwsResult<RolePolicyPage> {
        let mut extra = vec![("RoleName", role_name)];
        if let Some(m) = marker {
            extra.push(("Marker", m));
        }
        let xml = self.call("ListRolePolicies", &extra).await?;
        Ok(parse_policy_page(&xml))
    }

    async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> AwsResult<()> {
        self.call(
            "DeleteRolePolicy",
            &[("RoleName", role_name), ("PolicyName", policy_name)],
        )
        .await?;
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        self.call("DeleteRole", &[("RoleName", role_name)]).await?;
        Ok(())
    }
}
