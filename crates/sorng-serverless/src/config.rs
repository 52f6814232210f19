//! Region, credential and retry configuration.
//!
//! Follows the shape of `aws-config`: an [`SdkConfig`] aggregates region,
//! credentials and transport behaviour and is what the connection cache
//! builds service clients from. The create-function propagation policy
//! lives here too so callers can override it per manager instead of relying
//! on process-wide constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Regions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AwsRegion {
    /// Region code (e.g., "us-west-2").
    pub name: String,
}

impl AwsRegion {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Service endpoint in this region.
    pub fn endpoint(&self, service: &str) -> String {
        match service {
            "iam" if self.name.starts_with("cn-") => "https://iam.cn-north-1.amazonaws.com.cn".to_string(),
            "iam" if self.name.starts_with("us-gov-") => "https://iam.us-gov.amazonaws.com".to_string(),
            "iam" => "https://iam.amazonaws.com".to_string(),
            _ if self.name.starts_with("cn-") => {
                format!("https://{}.{}.amazonaws.com.cn", service, self.name)
            }
            _ => format!("https://{}.{}.amazonaws.com", service, self.name),
        }
    }

    /// Signing region for a service. IAM is global and signs in the
    /// partition's home region.
    pub fn signing_region(&self, service: &str) -> String {
        match (service, self.partition()) {
            ("iam", "aws-cn") => "cn-north-1".to_string(),
            ("iam", "aws-us-gov") => "us-gov-west-1".to_string(),
            ("iam", _) => "us-east-1".to_string(),
            _ => self.name.clone(),
        }
    }

    /// Partition used in ARNs (aws, aws-cn, aws-us-gov).
    pub fn partition(&self) -> &str {
        if self.name.starts_with("cn-") {
            "aws-cn"
        } else if self.name.starts_with("us-gov-") {
            "aws-us-gov"
        } else {
            "aws"
        }
    }
}

impl Default for AwsRegion {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

// ── Credentials ─────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Present for temporary (STS) credentials.
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl AwsCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn new_temporary(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            session_token: Some(session_token.to_string()),
            expiration,
            ..Self::new(access_key_id, secret_access_key)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiration.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    /// First four characters of the access key, for log lines.
    pub fn key_hint(&self) -> String {
        self.access_key_id.chars().take(4).collect()
    }

    /// Resolve credentials from the standard environment variables.
    pub fn from_environment() -> Option<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
            ..Self::new(&access_key, &secret_key)
        })
    }
}

// ── Retry Configuration ─────────────────────────────────────────────────

/// Transport-level retry for throttling and 5xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub mode: RetryMode,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            mode: RetryMode::Standard,
            initial_backoff_ms: 500,
            max_backoff_ms: 20_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum RetryMode {
    /// Exponential backoff with full jitter.
    Standard,
    /// Exponential backoff without jitter.
    Legacy,
}

/// Retry policy for function creation while a new role propagates.
///
/// The wait is a known propagation window, so the delay is fixed rather than
/// exponential. The defaults allow 30 × 5s = 2.5 minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreateRetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl CreateRetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 30;
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Upper bound on the time spent sleeping before giving up.
    pub fn total_wait(&self) -> Duration {
        self.delay * self.max_attempts
    }
}

impl Default for CreateRetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

// ── SDK Config ──────────────────────────────────────────────────────────

/// Everything needed to build the per-service clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    pub region: AwsRegion,
    pub credentials: AwsCredentials,
    pub retry_config: RetryConfig,
    /// Custom endpoint (LocalStack and friends). Applies to every service.
    pub endpoint_url: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Appended to the User-Agent header.
    pub app_name: Option<String>,
}

impl SdkConfig {
    pub fn new(region: AwsRegion, credentials: AwsCredentials) -> Self {
        Self {
            region,
            credentials,
            retry_config: RetryConfig::default(),
            endpoint_url: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            app_name: None,
        }
    }

    /// Build from `AWS_REGION`/`AWS_DEFAULT_REGION`, the credential
    /// variables and `AWS_ENDPOINT_URL`.
    pub fn from_environment() -> Result<Self, String> {
        let credentials = AwsCredentials::from_environment()
            .ok_or_else(|| "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set".to_string())?;
        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .map_err(|_| "AWS_REGION or AWS_DEFAULT_REGION must be set".to_string())?;
        let mut config = Self::new(AwsRegion::new(&region), credentials);
        config.endpoint_url = std::env::var("AWS_ENDPOINT_URL").ok();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.credentials.access_key_id.is_empty() {
            return Err("Access key ID is required".to_string());
        }
        if self.credentials.secret_access_key.is_empty() {
            return Err("Secret access key is required".to_string());
        }
        if self.region.name.is_empty() {
            return Err("Region is required".to_string());
        }
        if self.credentials.is_expired() {
            log::warn!(
                "Credentials for access key {}… are expired",
                self.credentials.key_hint()
            );
        }
        Ok(())
    }

    pub fn user_agent(&self) -> String {
        match self.app_name {
            Some(ref app) => format!("sorng-serverless/{} {}", env!("CARGO_PKG_VERSION"), app),
            None => format!("sorng-serverless/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
