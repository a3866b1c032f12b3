//! Common types for onion: errors, credential references, retry and telemetry

#![deny(missing_docs)]

pub mod credentials;
pub mod error;
pub mod retry;
pub mod telemetry;

pub use credentials::CredentialRef;
pub use error::{Error, ProviderError, ProviderOperation};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default region for provisioning campaigns
pub const DEFAULT_REGION: &str = "us-west-2";

/// Default instance type for masters and nodes
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.medium";

/// Default number of master instances
pub const DEFAULT_MASTER_COUNT: u32 = 1;

/// Default number of node instances
pub const DEFAULT_NODE_COUNT: u32 = 2;
