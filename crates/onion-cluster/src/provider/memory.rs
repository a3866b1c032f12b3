//! In-process provider for local development and tests
//!
//! Keeps instances in a table guarded by a mutex and hands out EC2-style
//! ids. Failures can be injected per instance name so partial-failure
//! handling can be exercised without a cloud account.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use onion_common::{ProviderError, ProviderOperation};

use super::{InstanceFilter, InstanceInfo, LaunchSpec, ProviderClient, ProviderInstanceState};
use crate::instance::Role;

#[derive(Default)]
struct State {
    /// Instances keyed by id
    instances: BTreeMap<String, InstanceInfo>,
    next_id: u64,
    fail_create: HashSet<String>,
    fail_terminate: HashSet<String>,
    fail_describe: bool,
    create_calls: Vec<String>,
    terminate_calls: Vec<String>,
}

/// Provider backed by an in-memory instance table
#[derive(Default)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl InMemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create call for `name` fail with a permanent error
    pub fn fail_create_of(&self, name: impl Into<String>) {
        self.state.lock().fail_create.insert(name.into());
    }

    /// Make every terminate call for the instance named `name` fail
    pub fn fail_terminate_of(&self, name: impl Into<String>) {
        self.state.lock().fail_terminate.insert(name.into());
    }

    /// Make describe calls fail with a transient error
    pub fn fail_describe(&self, fail: bool) {
        self.state.lock().fail_describe = fail;
    }

    /// Add an instance created outside this provider's create path
    pub fn insert_instance(&self, info: InstanceInfo) {
        self.state
            .lock()
            .instances
            .insert(info.instance_id.clone(), info);
    }

    /// Names passed to create, in call order
    pub fn create_calls(&self) -> Vec<String> {
        self.state.lock().create_calls.clone()
    }

    /// Ids passed to terminate, in call order
    pub fn terminate_calls(&self) -> Vec<String> {
        self.state.lock().terminate_calls.clone()
    }

    /// Snapshot of all known instances, sorted by name
    pub fn instances(&self) -> Vec<InstanceInfo> {
        let mut all: Vec<_> = self.state.lock().instances.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[async_trait]
impl ProviderClient for InMemoryProvider {
    async fn create_instance(
        &self,
        name: &str,
        role: Role,
        spec: &LaunchSpec,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock();
        state.create_calls.push(name.to_string());

        if state.fail_create.contains(name) {
            return Err(
                ProviderError::permanent(ProviderOperation::Create, "injected create failure")
                    .for_instance(name),
            );
        }

        state.next_id += 1;
        let instance_id = format!("i-{:017x}", state.next_id);
        debug!(instance = %name, instance_id = %instance_id, role = %role, region = %spec.region, "instance created");

        state.instances.insert(
            instance_id.clone(),
            InstanceInfo {
                instance_id: instance_id.clone(),
                name: name.to_string(),
                state: ProviderInstanceState::Running,
                tags: spec.tags.clone(),
            },
        );
        Ok(instance_id)
    }

    async fn describe_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<InstanceInfo>, ProviderError> {
        if self.state.lock().fail_describe {
            return Err(ProviderError::new(
                ProviderOperation::Describe,
                "injected describe failure",
            ));
        }
        Ok(self
            .instances()
            .into_iter()
            .filter(|info| filter.matches(&info.name))
            .collect())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.terminate_calls.push(instance_id.to_string());

        let name = match state.instances.get(instance_id) {
            Some(info) => info.name.clone(),
            None => {
                return Err(ProviderError::permanent(
                    ProviderOperation::Terminate,
                    "InvalidInstanceID.NotFound",
                )
                .for_instance(instance_id))
            }
        };

        if state.fail_terminate.contains(&name) {
            return Err(ProviderError::permanent(
                ProviderOperation::Terminate,
                "injected terminate failure",
            )
            .for_instance(instance_id));
        }

        if let Some(info) = state.instances.get_mut(instance_id) {
            info.state = ProviderInstanceState::Terminated;
        }
        debug!(instance = %name, instance_id = %instance_id, "instance terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onion_common::CredentialRef;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            region: "us-west-2".to_string(),
            instance_type: "t2.medium".to_string(),
            image_id: None,
            credential_ref: CredentialRef::default(),
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_describe_terminate() {
        let provider = InMemoryProvider::new();
        let id = provider
            .create_instance("ab12c-k8s-master-1", Role::Master, &spec())
            .await
            .unwrap();
        assert!(id.starts_with("i-"));

        let listed = provider
            .describe_instances(&InstanceFilter::with_prefixes(["ab12c-k8s-master"]))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, ProviderInstanceState::Running);

        provider.terminate_instance(&id).await.unwrap();
        assert_eq!(provider.instances()[0].state, ProviderInstanceState::Terminated);
        assert_eq!(provider.terminate_calls(), vec![id]);
    }

    #[tokio::test]
    async fn test_unknown_instance_cannot_be_terminated() {
        let provider = InMemoryProvider::new();
        let err = provider.terminate_instance("i-missing").await.unwrap_err();
        assert_eq!(err.operation, ProviderOperation::Terminate);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let provider = InMemoryProvider::new();
        provider.fail_create_of("x-2");
        assert!(provider.create_instance("x-1", Role::Node, &spec()).await.is_ok());
        let err = provider
            .create_instance("x-2", Role::Node, &spec())
            .await
            .unwrap_err();
        assert_eq!(err.instance.as_deref(), Some("x-2"));
        assert_eq!(provider.create_calls(), vec!["x-1", "x-2"]);

        provider.fail_describe(true);
        assert!(provider
            .describe_instances(&InstanceFilter::all())
            .await
            .unwrap_err()
            .retryable);
    }

    #[tokio::test]
    async fn test_describe_with_no_matches_is_empty_not_error() {
        let provider = InMemoryProvider::new();
        let listed = provider
            .describe_instances(&InstanceFilter::with_prefixes(["nothing"]))
            .await
            .unwrap();
        assert!(listed.is_empty());
    }
}
