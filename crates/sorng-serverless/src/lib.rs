//! # sorng-serverless – serverless deployment reconciliation
//!
//! Drives Lambda functions, their IAM execution roles, API Gateway REST APIs
//! and CloudWatch log groups toward a desired state. The caller decides what
//! should exist; this crate makes it so without duplicating side effects when
//! an operation is retried.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  ServerlessClient  (service.rs)                  │
//! │  ├── FunctionManager (functions.rs)              │
//! │  │    └── tag diffing (tags.rs)                  │
//! │  ├── RoleManager     (roles.rs)                  │
//! │  ├── GatewayManager  (gateway.rs)                │
//! │  │    └── idempotent grants (permissions.rs)     │
//! │  ├── SDK transfer    (sdk.rs)                    │
//! │  └── log event stream (logs.rs)                  │
//! ├──────────────────────────────────────────────────┤
//! │  ConnectionCache  (registry.rs)                  │
//! │  └── ComputeApi · IdentityApi · GatewayApi ·     │
//! │      LogsApi, built once per capability          │
//! ├──────────────────────────────────────────────────┤
//! │  LambdaClient · IamClient · ApiGatewayClient ·   │
//! │  LogsClient  over AwsClient (client.rs)          │
//! ├──────────────────────────────────────────────────┤
//! │  SigV4Signer  (signing.rs)                       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## API Protocols
//!
//! | Protocol      | Services                  |
//! |---------------|---------------------------|
//! | REST + JSON   | Lambda, API Gateway       |
//! | Query + XML   | IAM                       |
//! | JSON 1.1      | CloudWatch Logs           |

pub mod error;
pub mod config;
pub mod signing;
pub mod client;

// Capabilities
pub mod lambda;
pub mod iam;
pub mod apigateway;
pub mod logs;
pub mod registry;

// Reconciliation
pub mod tags;
pub mod permissions;
pub mod functions;
pub mod roles;
pub mod gateway;
pub mod sdk;

pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AwsCredentials, AwsRegion, CreateRetryPolicy, SdkConfig};
pub use error::{AwsError, ErrorKind, ServerlessError, ServerlessResult};
pub use functions::{FunctionSpec, FunctionUpdate};
pub use registry::{Capability, ClientFactory, ConnectionCache, ServiceHandle};
pub use roles::RoleSpec;
pub use service::ServerlessClient;
pub use tags::{TagDiff, TagSet};
