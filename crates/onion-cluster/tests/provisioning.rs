//! Provisioning campaigns against the in-memory provider
//!
//! Exercises the public API end to end: a manager drives real provider
//! calls, and the provider's own table is checked against the records the
//! manager reports.

use std::collections::HashSet;
use std::sync::Arc;

use onion_cluster::{
    ClusterConfig, ClusterManager, ClusterSpec, Disposition, InMemoryProvider, InstanceFilter,
    InstanceState, LaunchStrategy, Outcome, ProviderClient, ProviderInstanceState, Role,
    SkipReason,
};
use tokio_util::sync::CancellationToken;

fn setup(spec: ClusterSpec, token: &str) -> (Arc<InMemoryProvider>, ClusterManager) {
    let provider = Arc::new(InMemoryProvider::new());
    let config = ClusterConfig::from_spec_with_token(spec, token).unwrap();
    let manager = ClusterManager::with_config(config, provider.clone());
    (provider, manager)
}

fn k8s(masters: u32, nodes: u32) -> ClusterSpec {
    ClusterSpec::new("kubernetes")
        .with_masters(masters)
        .with_nodes(nodes)
}

/// Story: a full campaign provisions, checks and tears down a cluster
#[tokio::test]
async fn story_full_campaign_leaves_nothing_running() {
    let (provider, manager) = setup(k8s(1, 2), "cmp01");
    let cancel = CancellationToken::new();

    let provisioned = manager.provision(&cancel).await.unwrap();
    assert_eq!(provisioned.outcome(), Outcome::Complete);
    assert_eq!(
        provider.create_calls(),
        vec!["cmp01-k8s-master-1", "cmp01-k8s-node-1", "cmp01-k8s-node-2"]
    );

    let reconciliation = manager.reconcile().await.unwrap();
    assert!(reconciliation.is_consistent());
    assert_eq!(reconciliation.masters.len(), 1);
    assert_eq!(reconciliation.nodes.len(), 2);

    let torn_down = manager.terminate_all(&cancel).await.unwrap();
    assert_eq!(torn_down.outcome(), Outcome::Complete);
    assert_eq!(
        torn_down.with_disposition(Disposition::Terminated).count(),
        3
    );
    assert!(provider
        .instances()
        .iter()
        .all(|i| i.state == ProviderInstanceState::Terminated));
}

/// Story: one node hits a quota limit mid-campaign
///
/// The provider ends up with exactly the instances reported running, and
/// teardown only touches those.
#[tokio::test]
async fn story_partial_failure_is_visible_and_cleanly_torn_down() {
    let (provider, manager) = setup(k8s(1, 3), "prt01");
    provider.fail_create_of("prt01-k8s-node-2");
    let cancel = CancellationToken::new();

    let provisioned = manager.provision(&cancel).await.unwrap();
    assert_eq!(provisioned.outcome(), Outcome::Partial);
    assert_eq!(provisioned.records().len(), 4);
    assert_eq!(provider.create_calls().len(), 4);

    let failed: Vec<_> = provisioned.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "prt01-k8s-node-2");
    assert_eq!(failed[0].role, Role::Node);
    assert_eq!(failed[0].ordinal, 2);

    let running: HashSet<_> = provisioned
        .running()
        .map(|r| r.instance_id.clone())
        .collect();
    let live: HashSet<_> = provider
        .instances()
        .into_iter()
        .map(|i| i.instance_id)
        .collect();
    assert_eq!(running, live);

    let torn_down = manager.terminate_all(&cancel).await.unwrap();
    assert_eq!(torn_down.outcome(), Outcome::Complete);
    assert_eq!(provider.terminate_calls().len(), 3);
    let skipped: Vec<_> = torn_down.with_disposition(Disposition::Skipped).collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].skip_reason, Some(SkipReason::NotRunning));
}

#[tokio::test]
async fn test_terminate_failure_keeps_batch_going() {
    let (provider, manager) = setup(k8s(2, 1), "trm01");
    provider.fail_terminate_of("trm01-k8s-master-2");
    let cancel = CancellationToken::new();

    manager.provision(&cancel).await.unwrap();
    let torn_down = manager.terminate_all(&cancel).await.unwrap();

    assert_eq!(torn_down.outcome(), Outcome::Partial);
    assert_eq!(provider.terminate_calls().len(), 3);

    let failed: Vec<_> = torn_down.with_disposition(Disposition::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].record.name, "trm01-k8s-master-2");
    assert_eq!(failed[0].record.state(), InstanceState::Failed);
    assert!(failed[0].record.error().is_some());

    // The instance the provider refused to terminate is still up
    let still_up: Vec<_> = provider
        .instances()
        .into_iter()
        .filter(|i| i.state == ProviderInstanceState::Running)
        .map(|i| i.name)
        .collect();
    assert_eq!(still_up, vec!["trm01-k8s-master-2"]);
}

#[tokio::test]
async fn test_parallel_strategy_launches_masters_before_nodes() {
    let (provider, manager) = setup(k8s(3, 4), "par01");
    let manager = manager.with_strategy(LaunchStrategy::ParallelPerRole);

    let provisioned = manager.provision(&CancellationToken::new()).await.unwrap();
    assert_eq!(provisioned.outcome(), Outcome::Complete);

    let calls = provider.create_calls();
    assert_eq!(calls.len(), 7);
    assert!(calls[..3].iter().all(|n| n.starts_with("par01-k8s-master-")));
    assert!(calls[3..].iter().all(|n| n.starts_with("par01-k8s-node-")));

    let ordinals: Vec<_> = provisioned.nodes().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4]);
}

/// Story: the process restarts and rebuilds its manager from a saved token
///
/// The new manager holds no records, so everything the provider reports is
/// untracked. Instances of other clusters are left out.
#[tokio::test]
async fn story_restart_recovers_cluster_from_token() {
    let provider = Arc::new(InMemoryProvider::new());
    let cancel = CancellationToken::new();

    let first = ClusterManager::with_config(
        ClusterConfig::from_spec_with_token(k8s(1, 2), "rst01").unwrap(),
        provider.clone(),
    );
    first.provision(&cancel).await.unwrap();

    let neighbour = ClusterManager::with_config(
        ClusterConfig::from_spec_with_token(k8s(1, 1), "oth01").unwrap(),
        provider.clone(),
    );
    neighbour.provision(&cancel).await.unwrap();

    let recovered = ClusterManager::with_config(
        ClusterConfig::from_spec_with_token(k8s(1, 2), "rst01").unwrap(),
        provider.clone(),
    );
    let reconciliation = recovered.reconcile().await.unwrap();

    assert_eq!(reconciliation.owned_count(), 3);
    assert_eq!(reconciliation.untracked.len(), 3);
    assert_eq!(reconciliation.masters.len(), 1);
    assert_eq!(reconciliation.nodes.len(), 2);
    assert!(!reconciliation.is_consistent());
    assert!(reconciliation
        .untracked
        .iter()
        .all(|i| recovered.owns(&i.name)));
}

#[tokio::test]
async fn test_reconcile_reports_records_missing_from_provider() {
    let (provider, manager) = setup(k8s(1, 1), "mis01");
    let cancel = CancellationToken::new();
    let provisioned = manager.provision(&cancel).await.unwrap();

    // Someone terminates a node behind the manager's back
    let node_id = provisioned.nodes().next().unwrap().instance_id.clone();
    provider.terminate_instance(&node_id).await.unwrap();

    let reconciliation = manager.reconcile().await.unwrap();
    assert_eq!(reconciliation.missing.len(), 1);
    assert_eq!(reconciliation.missing[0].instance_id, node_id);
    assert!(reconciliation.untracked.is_empty());
}

#[tokio::test]
async fn test_describe_failure_is_reported_not_swallowed() {
    let (provider, manager) = setup(k8s(1, 0), "dsc01");
    provider.fail_describe(true);

    let err = manager.reconcile().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(manager
        .describe(&InstanceFilter::all())
        .await
        .is_err());
}

#[tokio::test]
async fn test_independent_managers_get_distinct_prefixes() {
    let provider = Arc::new(InMemoryProvider::new());
    let a = ClusterManager::new(k8s(1, 1), provider.clone()).unwrap();
    let b = ClusterManager::new(k8s(1, 1), provider.clone()).unwrap();

    // 36^5 tokens; a collision here would be a one in sixty million event
    assert_ne!(a.config().token(), b.config().token());
    assert_ne!(a.config().master_prefix(), b.config().master_prefix());

    let cancel = CancellationToken::new();
    a.provision(&cancel).await.unwrap();
    b.provision(&cancel).await.unwrap();

    let names: HashSet<_> = provider.instances().into_iter().map(|i| i.name).collect();
    assert_eq!(names.len(), 4);
}

#[tokio::test]
async fn test_launched_instances_carry_cluster_tags() {
    let (provider, manager) = setup(ClusterSpec::new("openshift").with_nodes(1), "tag01");
    manager.provision(&CancellationToken::new()).await.unwrap();

    let instances = provider.instances();
    let master = instances
        .iter()
        .find(|i| i.name == "tag01-openshift-master-1")
        .unwrap();
    assert_eq!(master.tags["onion.io/cluster"], "tag01");
    assert_eq!(master.tags["onion.io/role"], "master");
    assert_eq!(master.tags["onion.io/workload"], "openshift");
}
