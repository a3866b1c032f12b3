//! Cluster provisioning for onion
//!
//! Turns a [`ClusterSpec`] into a set of named cloud instances (masters
//! first, then nodes) through a [`ProviderClient`], tracking each instance
//! on its own [`InstanceRecord`] so partial failures are reported rather
//! than hidden.
//!
//! Related crates:
//! - `onion-common`: errors, credential references, retry and telemetry
//! - `onion-cli`: the `onion` command line front end

#![deny(missing_docs)]

pub mod config;
pub mod instance;
pub mod manager;
pub mod names;
pub mod provider;
pub mod result;

pub use config::{ClusterConfig, ClusterSpec, WorkloadType};
pub use instance::{InstanceRecord, InstanceState, Role};
pub use manager::{ClusterManager, LaunchStrategy};
pub use names::{new_prefixes, Prefixes};
pub use provider::{
    InMemoryProvider, InstanceFilter, InstanceInfo, LaunchSpec, ProviderClient,
    ProviderInstanceState,
};
pub use result::{
    Disposition, Outcome, ProvisionResult, Reconciliation, SkipReason, TerminateEntry,
    TerminateResult,
};

// Re-export common error types
pub use onion_common::{Error, Result};
