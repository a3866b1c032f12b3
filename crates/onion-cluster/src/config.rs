//! Cluster configuration
//!
//! [`ClusterSpec`] is caller input: it deserializes from a YAML cluster file
//! and is freely editable. [`ClusterConfig`] is what a manager runs with: the
//! validated spec plus the generated name prefixes, immutable from then on.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use onion_common::{
    CredentialRef, Error, Result, DEFAULT_INSTANCE_TYPE, DEFAULT_MASTER_COUNT,
    DEFAULT_NODE_COUNT, DEFAULT_REGION,
};

use crate::instance::Role;
use crate::names::{self, Prefixes};
use crate::provider::LaunchSpec;

/// Tag key reserved for the cluster token
pub const TAG_CLUSTER: &str = "onion.io/cluster";
/// Tag key reserved for the instance role
pub const TAG_ROLE: &str = "onion.io/role";
/// Tag key reserved for the workload type
pub const TAG_WORKLOAD: &str = "onion.io/workload";

const RESERVED_TAG_PREFIX: &str = "onion.io/";

/// Cluster flavor being provisioned
///
/// Only affects instance naming. Anything other than kubernetes or openshift
/// is kept verbatim and names fall back to the bare cluster token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkloadType {
    /// Kubernetes (`k8s-master` / `k8s-node`)
    Kubernetes,
    /// OpenShift (`openshift-master` / `openshift-node`)
    OpenShift,
    /// Unrecognized workload, kept as given
    Other(String),
}

impl WorkloadType {
    /// Parse a workload type, case-insensitively
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("kubernetes") {
            Self::Kubernetes
        } else if trimmed.eq_ignore_ascii_case("openshift") {
            Self::OpenShift
        } else {
            Self::Other(trimmed.to_string())
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Kubernetes => "kubernetes",
            Self::OpenShift => "openshift",
            Self::Other(other) => other,
        }
    }

    /// Whether no workload was given at all
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Other(other) if other.is_empty())
    }
}

impl From<String> for WorkloadType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for WorkloadType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<WorkloadType> for String {
    fn from(value: WorkloadType) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for WorkloadType {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_master_count() -> u32 {
    DEFAULT_MASTER_COUNT
}

fn default_node_count() -> u32 {
    DEFAULT_NODE_COUNT
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_instance_type() -> String {
    DEFAULT_INSTANCE_TYPE.to_string()
}

/// Requested cluster shape, as supplied by the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Workload type (kubernetes, openshift, or anything else)
    pub workload_type: WorkloadType,
    /// Number of master instances (at least 1)
    #[serde(default = "default_master_count")]
    pub master_count: u32,
    /// Number of node instances
    #[serde(default = "default_node_count")]
    pub node_count: u32,
    /// Provider region
    #[serde(default = "default_region")]
    pub region: String,
    /// Opaque credential handle resolved by the provider
    #[serde(default)]
    pub credential_ref: CredentialRef,
    /// Instance type for nodes, and for masters unless overridden
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Instance type override for masters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_instance_type: Option<String>,
    /// Machine image to boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    /// Extra tags applied to every instance
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl ClusterSpec {
    /// Create a spec with defaults for everything but the workload type
    pub fn new(workload_type: impl Into<WorkloadType>) -> Self {
        Self {
            workload_type: workload_type.into(),
            master_count: DEFAULT_MASTER_COUNT,
            node_count: DEFAULT_NODE_COUNT,
            region: default_region(),
            credential_ref: CredentialRef::default(),
            instance_type: default_instance_type(),
            master_instance_type: None,
            image_id: None,
            tags: BTreeMap::new(),
        }
    }

    /// Set the master count
    pub fn with_masters(mut self, count: u32) -> Self {
        self.master_count = count;
        self
    }

    /// Set the node count
    pub fn with_nodes(mut self, count: u32) -> Self {
        self.node_count = count;
        self
    }

    /// Set the region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the credential reference
    pub fn with_credential_ref(mut self, credential_ref: CredentialRef) -> Self {
        self.credential_ref = credential_ref;
        self
    }

    /// Validate the spec without side effects
    pub fn validate(&self) -> Result<()> {
        if self.workload_type.is_empty() {
            return Err(Error::config_field("workload_type", "must not be empty"));
        }
        if self.master_count < 1 {
            return Err(Error::config_field("master_count", "must be at least 1"));
        }
        if self.region.trim().is_empty() {
            return Err(Error::config_field("region", "must not be empty"));
        }
        if self.credential_ref.is_empty() {
            return Err(Error::config_field("credential_ref", "must not be empty"));
        }
        if self.instance_type.trim().is_empty() {
            return Err(Error::config_field("instance_type", "must not be empty"));
        }
        if let Some(ref master_type) = self.master_instance_type {
            if master_type.trim().is_empty() {
                return Err(Error::config_field(
                    "master_instance_type",
                    "must not be empty when set",
                ));
            }
        }
        if let Some(key) = self
            .tags
            .keys()
            .find(|k| k.starts_with(RESERVED_TAG_PREFIX))
        {
            return Err(Error::config_field(
                "tags",
                format!("tag key '{}' uses the reserved onion.io/ prefix", key),
            ));
        }
        Ok(())
    }
}

/// Validated, immutable configuration of one cluster
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    spec: ClusterSpec,
    prefixes: Prefixes,
}

impl ClusterConfig {
    /// Validate the spec and generate fresh name prefixes
    pub fn from_spec(spec: ClusterSpec) -> Result<Self> {
        spec.validate()?;
        let prefixes = names::new_prefixes(&spec.workload_type);
        Ok(Self { spec, prefixes })
    }

    /// Validate the spec and reuse a known cluster token
    ///
    /// Rebuilds the identity of a cluster whose token the caller persisted,
    /// so its instances can be reconciled after a restart.
    pub fn from_spec_with_token(spec: ClusterSpec, token: impl Into<String>) -> Result<Self> {
        spec.validate()?;
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::config_field("token", "must not be empty"));
        }
        let prefixes = Prefixes::for_token(token, &spec.workload_type);
        Ok(Self { spec, prefixes })
    }

    /// The spec this config was built from
    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// Workload type
    pub fn workload_type(&self) -> &WorkloadType {
        &self.spec.workload_type
    }

    /// Number of masters
    pub fn master_count(&self) -> u32 {
        self.spec.master_count
    }

    /// Number of nodes
    pub fn node_count(&self) -> u32 {
        self.spec.node_count
    }

    /// Total number of instances in the cluster
    pub fn total_instances(&self) -> usize {
        self.spec.master_count as usize + self.spec.node_count as usize
    }

    /// Instance count for a role
    pub fn count_for(&self, role: Role) -> u32 {
        match role {
            Role::Master => self.spec.master_count,
            Role::Node => self.spec.node_count,
        }
    }

    /// Generated name prefixes
    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    /// Cluster token
    pub fn token(&self) -> &str {
        &self.prefixes.token
    }

    /// Master name prefix
    pub fn master_prefix(&self) -> &str {
        &self.prefixes.master
    }

    /// Node name prefix
    pub fn node_prefix(&self) -> &str {
        &self.prefixes.node
    }

    /// Name prefix for a role
    pub fn prefix_for(&self, role: Role) -> &str {
        match role {
            Role::Master => &self.prefixes.master,
            Role::Node => &self.prefixes.node,
        }
    }

    /// Region
    pub fn region(&self) -> &str {
        &self.spec.region
    }

    /// Credential reference
    pub fn credential_ref(&self) -> &CredentialRef {
        &self.spec.credential_ref
    }

    /// Instance name for a role and 1-based ordinal
    pub fn instance_name(&self, role: Role, ordinal: u32) -> String {
        format!("{}-{}", self.prefix_for(role), ordinal)
    }

    /// Whether an instance name falls under one of this cluster's prefixes
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.prefixes.master) || name.starts_with(&self.prefixes.node)
    }

    /// Launch parameters for instances of a role
    pub fn launch_spec(&self, role: Role) -> LaunchSpec {
        let instance_type = match role {
            Role::Master => self
                .spec
                .master_instance_type
                .clone()
                .unwrap_or_else(|| self.spec.instance_type.clone()),
            Role::Node => self.spec.instance_type.clone(),
        };

        let mut tags = self.spec.tags.clone();
        tags.insert(TAG_CLUSTER.to_string(), self.prefixes.token.clone());
        tags.insert(TAG_ROLE.to_string(), role.to_string());
        tags.insert(
            TAG_WORKLOAD.to_string(),
            self.spec.workload_type.to_string(),
        );

        LaunchSpec {
            region: self.spec.region.clone(),
            instance_type,
            image_id: self.spec.image_id.clone(),
            credential_ref: self.spec.credential_ref.clone(),
            tags,
        }
    }
}
