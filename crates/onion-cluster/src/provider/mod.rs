//! Cloud provider instance API abstraction
//!
//! The orchestrator talks to the provider only through [`ProviderClient`]:
//! create, describe and terminate. Implementations translate to a vendor's
//! wire format and report failures as [`ProviderError`]. Retries are not
//! done here; the manager owns retry policy.
//!
//! # Implementations
//!
//! - [`InMemoryProvider`] - in-process provider for local runs and tests

mod memory;

pub use memory::InMemoryProvider;

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use onion_common::{CredentialRef, ProviderError};

use crate::instance::Role;

/// Launch parameters for a single instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Region to launch in
    pub region: String,
    /// Provider instance type (e.g. "t2.medium")
    pub instance_type: String,
    /// Machine image, provider default when unset
    pub image_id: Option<String>,
    /// Credential handle for the provider to resolve
    pub credential_ref: CredentialRef,
    /// Tags applied to the instance
    pub tags: BTreeMap<String, String>,
}

/// Provider-reported instance state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderInstanceState {
    /// Accepted, booting
    Pending,
    /// Running
    Running,
    /// Shutting down
    Stopping,
    /// Gone
    Terminated,
    /// State the client could not map
    Unknown,
}

/// An instance as the provider reports it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    /// Provider-assigned id
    pub instance_id: String,
    /// Instance name
    pub name: String,
    /// Provider-reported state
    pub state: ProviderInstanceState,
    /// Instance tags
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Selects instances by name prefix
///
/// An empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Name prefixes, any of which may match
    pub name_prefixes: Vec<String>,
}

impl InstanceFilter {
    /// Filter matching every instance
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching names under any of the given prefixes
    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut name_prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
        name_prefixes.sort();
        name_prefixes.dedup();
        Self { name_prefixes }
    }

    /// Whether a name passes the filter
    pub fn matches(&self, name: &str) -> bool {
        self.name_prefixes.is_empty() || self.name_prefixes.iter().any(|p| name.starts_with(p))
    }
}

/// Capability interface over a cloud provider's instance API
///
/// Calls block until the provider acknowledges the request, not until the
/// instance reaches its final state.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create one instance and return its provider-assigned id
    ///
    /// Fails on quota, auth or network errors.
    async fn create_instance(
        &self,
        name: &str,
        role: Role,
        spec: &LaunchSpec,
    ) -> Result<String, ProviderError>;

    /// List instances matching the filter
    ///
    /// An empty list is not an error.
    async fn describe_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<InstanceInfo>, ProviderError>;

    /// Request termination of an instance
    ///
    /// Fails if the id is unknown to the provider or the call is rejected.
    async fn terminate_instance(&self, instance_id: &str) -> Result<(), ProviderError>;
}
