//! Connection cache: one service handle per capability for the lifetime of
//! the cache.
//!
//! Handles are built lazily by a [`ClientFactory`] the first time a
//! capability is asked for and then shared. There is no eviction and no
//! close; the cache lives as long as the client that owns it.

use crate::apigateway::{ApiGatewayClient, GatewayApi};
use crate::client::AwsClient;
use crate::config::SdkConfig;
use crate::iam::{IamClient, IdentityApi};
use crate::lambda::{ComputeApi, LambdaClient};
use crate::logs::{LogsApi, LogsClient};
use std::fmt;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Compute,
    Identity,
    Gateway,
    Logs,
}

impl Capability {
    pub const ALL: [Capability; 4] = [Self::Compute, Self::Identity, Self::Gateway, Self::Logs];

    /// Signing name of the backing AWS service.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Compute => "lambda",
            Self::Identity => "iam",
            Self::Gateway => "apigateway",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// A typed handle for one capability.
#[derive(Clone)]
pub enum ServiceHandle {
    Compute(Arc<dyn ComputeApi>),
    Identity(Arc<dyn IdentityApi>),
    Gateway(Arc<dyn GatewayApi>),
    Logs(Arc<dyn LogsApi>),
}

impl ServiceHandle {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Compute(_) => Capability::Compute,
            Self::Identity(_) => Capability::Identity,
            Self::Gateway(_) => Capability::Gateway,
            Self::Logs(_) => Capability::Logs,
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceHandle({})", self.capability())
    }
}

/// Builds service handles on demand.
pub trait ClientFactory: Send + Sync {
    fn compute(&self) -> Arc<dyn ComputeApi>;
    fn identity(&self) -> Arc<dyn IdentityApi>;
    fn gateway(&self) -> Arc<dyn GatewayApi>;
    fn logs(&self) -> Arc<dyn LogsApi>;
}

/// Factory backed by SigV4 HTTP clients sharing one configuration.
pub struct AwsClientFactory {
    config: Arc<SdkConfig>,
}

impl AwsClientFactory {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn client(&self, capability: Capability) -> AwsClient {
        log::debug!(
            "Creating {} client for region {}",
            capability,
            self.config.region.name
        );
        AwsClient::new(Arc::clone(&self.config))
    }
}

impl ClientFactory for AwsClientFactory {
    fn compute(&self) -> Arc<dyn ComputeApi> {
        Arc::new(LambdaClient::new(self.client(Capability::Compute)))
    }

    fn identity(&self) -> Arc<dyn IdentityApi> {
        Arc::new(IamClient::new(self.client(Capability::Identity)))
    }

    fn gateway(&self) -> Arc<dyn GatewayApi> {
        Arc::new(ApiGatewayClient::new(self.client(Capability::Gateway)))
    }

    fn logs(&self) -> Arc<dyn LogsApi> {
        Arc::new(LogsClient::new(self.client(Capability::Logs)))
    }
}

pub struct ConnectionCache {
    factory: Box<dyn ClientFactory>,
    compute: OnceLock<Arc<dyn ComputeApi>>,
    identity: OnceLock<Arc<dyn IdentityApi>>,
    gateway: OnceLock<Arc<dyn GatewayApi>>,
    logs: OnceLock<Arc<dyn LogsApi>>,
}

impl ConnectionCache {
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            compute: OnceLock::new(),
            identity: OnceLock::new(),
            gateway: OnceLock::new(),
            logs: OnceLock::new(),
        }
    }

    pub fn from_config(config: SdkConfig) -> Self {
        Self::new(AwsClientFactory::new(config))
    }

    pub fn compute(&self) -> Arc<dyn ComputeApi> {
        Arc::clone(self.compute.get_or_init(|| self.factory.compute()))
    }

    pub fn identity(&self) -> Arc<dyn IdentityApi> {
        Arc::clone(self.identity.get_or_init(|| self.factory.identity()))
    }

    pub fn gateway(&self) -> Arc<dyn GatewayApi> {
        Arc::clone(self.gateway.get_or_init(|| self.factory.gateway()))
    }

    pub fn logs(&self) -> Arc<dyn LogsApi> {
        Arc::clone(self.logs.get_or_init(|| self.factory.logs()))
    }

    pub fn handle_for(&self, capability: Capability) -> ServiceHandle {
        match capability {
            Capability::Compute => ServiceHandle::Compute(self.compute()),
            Capability::Identity => ServiceHandle::Identity(self.identity()),
            Capability::Gateway => ServiceHandle::Gateway(self.gateway()),
            Capability::Logs => ServiceHandle::Logs(self.logs()),
        }
    }
}
