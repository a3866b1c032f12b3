//! Cluster provisioning orchestrator
//!
//! A [`ClusterManager`] runs one provisioning campaign for one cluster:
//! provision, optionally describe/reconcile, optionally terminate.
//!
//! Batches never abort on a single failed instance. Each create or terminate
//! call is accounted for on its own record, the remaining instances are still
//! attempted, and the aggregate [`Outcome`](crate::Outcome) tells the caller
//! whether remediation is needed. The manager itself never rolls back.
//!
//! Masters are always launched before nodes. With
//! [`LaunchStrategy::ParallelPerRole`] instances within a role are launched
//! concurrently, but no node create is issued until every master create has
//! returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use onion_common::retry::{retry_with_backoff, RetryConfig};
use onion_common::{Error, Result};

use crate::config::{ClusterConfig, ClusterSpec};
use crate::instance::{InstanceRecord, InstanceState, Role};
use crate::provider::{InstanceFilter, InstanceInfo, ProviderClient};
use crate::result::{
    Disposition, ProvisionResult, Reconciliation, SkipReason, TerminateEntry, TerminateResult,
};

/// How instances within one role are launched
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchStrategy {
    /// One create call at a time, in ordinal order
    #[default]
    Sequential,
    /// All creates of a role at once; roles still run masters first
    ParallelPerRole,
}

/// Orchestrates instance lifecycle for one cluster
pub struct ClusterManager {
    config: ClusterConfig,
    provider: Arc<dyn ProviderClient>,
    retry: RetryConfig,
    strategy: LaunchStrategy,
    /// Held for the whole of a provision or terminate batch
    held: Mutex<Held>,
}

/// Records a manager is responsible for
#[derive(Default)]
struct Held {
    /// Set once `provision` has run
    provisioned: bool,
    /// Launched records, plus owned records adopted through `terminate`
    records: Vec<InstanceRecord>,
}

impl ClusterManager {
    /// Validate the spec, generate name prefixes and build a manager
    ///
    /// Fails with a configuration error before any provider call.
    pub fn new(spec: ClusterSpec, provider: Arc<dyn ProviderClient>) -> Result<Self> {
        let config = ClusterConfig::from_spec(spec)?;
        Ok(Self::with_config(config, provider))
    }

    /// Build a manager from an already validated config
    pub fn with_config(config: ClusterConfig, provider: Arc<dyn ProviderClient>) -> Self {
        debug!(
            cluster = %config.token(),
            workload = %config.workload_type(),
            master_prefix = %config.master_prefix(),
            node_prefix = %config.node_prefix(),
            "cluster manager created"
        );
        Self {
            config,
            provider,
            retry: RetryConfig::none(),
            strategy: LaunchStrategy::default(),
            held: Mutex::new(Held::default()),
        }
    }

    /// Retry transient failures of individual provider calls
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Choose how instances within a role are launched
    pub fn with_strategy(mut self, strategy: LaunchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Cluster configuration
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Whether an instance name belongs to this cluster
    pub fn owns(&self, name: &str) -> bool {
        self.config.owns(name)
    }

    /// Snapshot of the records this manager holds
    pub async fn records(&self) -> Vec<InstanceRecord> {
        self.held.lock().await.records.clone()
    }

    /// Launch every instance of the cluster, masters first
    ///
    /// Returns the full result whatever the outcome. Errors are reserved for
    /// misuse: a manager provisions once per campaign.
    #[instrument(skip(self, cancel), fields(cluster = %self.config.token()))]
    pub async fn provision(&self, cancel: &CancellationToken) -> Result<ProvisionResult> {
        let mut held = self.held.lock().await;
        if held.provisioned {
            return Err(Error::internal_with_context(
                "manager",
                "cluster already provisioned, start a new manager for another campaign",
            ));
        }
        if !held.records.is_empty() {
            return Err(Error::internal_with_context(
                "manager",
                format!(
                    "manager holds {} record(s) adopted through terminate and was never provisioned; \
                     provisioning would reuse their names, start a new manager with a fresh token",
                    held.records.len()
                ),
            ));
        }

        info!(
            workload = %self.config.workload_type(),
            masters = self.config.master_count(),
            nodes = self.config.node_count(),
            region = %self.config.region(),
            strategy = ?self.strategy,
            "provisioning cluster"
        );

        let mut records = self.plan();
        let (masters, nodes) = records.split_at_mut(self.config.master_count() as usize);
        for batch in [masters, nodes] {
            self.launch_batch(batch, cancel).await?;
        }

        let result = ProvisionResult::from_records(records);
        held.records = result.records().to_vec();
        held.provisioned = true;

        info!(
            outcome = ?result.outcome(),
            running = result.running().count(),
            failed = result.failed().count(),
            cancelled = result.is_cancelled(),
            "provisioning finished"
        );
        Ok(result)
    }

    /// Terminate the given records
    ///
    /// Only `running` records are attempted. Others are reported as skipped,
    /// as are records outside this cluster's prefixes. When the manager holds
    /// a record with the same identity, its own copy decides the current
    /// state, and it is updated with the outcome.
    #[instrument(skip(self, records, cancel), fields(cluster = %self.config.token()))]
    pub async fn terminate(
        &self,
        records: &[InstanceRecord],
        cancel: &CancellationToken,
    ) -> Result<TerminateResult> {
        let mut held = self.held.lock().await;
        self.terminate_batch(&mut held.records, records.to_vec(), cancel)
            .await
    }

    /// Terminate every record this manager holds
    #[instrument(skip(self, cancel), fields(cluster = %self.config.token()))]
    pub async fn terminate_all(&self, cancel: &CancellationToken) -> Result<TerminateResult> {
        let mut held = self.held.lock().await;
        let targets = held.records.clone();
        self.terminate_batch(&mut held.records, targets, cancel).await
    }

    /// List provider instances matching the filter
    ///
    /// Reads the provider only, never the local records.
    pub async fn describe(&self, filter: &InstanceFilter) -> Result<Vec<InstanceInfo>> {
        Ok(self.provider.describe_instances(filter).await?)
    }

    /// Match provider-observed instances against this manager's records
    #[instrument(skip(self), fields(cluster = %self.config.token()))]
    pub async fn reconcile(&self) -> Result<Reconciliation> {
        let filter =
            InstanceFilter::with_prefixes([self.config.master_prefix(), self.config.node_prefix()]);
        let observed = self.describe(&filter).await?;
        let records = self.records().await;

        let reconciliation = Reconciliation::build(&self.config, observed, &records);
        if !reconciliation.is_consistent() {
            warn!(
                untracked = reconciliation.untracked.len(),
                missing = reconciliation.missing.len(),
                "provider state differs from local records"
            );
        }
        Ok(reconciliation)
    }

    /// Pending records for every instance, masters first
    fn plan(&self) -> Vec<InstanceRecord> {
        Role::ALL
            .into_iter()
            .flat_map(|role| {
                (1..=self.config.count_for(role)).map(move |ordinal| {
                    InstanceRecord::pending(role, ordinal, self.config.instance_name(role, ordinal))
                })
            })
            .collect()
    }

    async fn launch_batch(
        &self,
        batch: &mut [InstanceRecord],
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.strategy {
            LaunchStrategy::Sequential => {
                for record in batch.iter_mut() {
                    if !self.launch(record, cancel).await? {
                        break;
                    }
                }
            }
            LaunchStrategy::ParallelPerRole => {
                let launches = batch.iter_mut().map(|record| self.launch(record, cancel));
                for launched in futures::future::join_all(launches).await {
                    launched?;
                }
            }
        }
        Ok(())
    }

    /// Issue the create call for one record
    ///
    /// Returns false without calling the provider once cancelled.
    async fn launch(&self, record: &mut InstanceRecord, cancel: &CancellationToken) -> Result<bool> {
        if cancel.is_cancelled() {
            debug!(instance = %record.name, "cancelled before launch");
            return Ok(false);
        }

        record.transition(InstanceState::Launching)?;
        let spec = self.config.launch_spec(record.role);
        let name = record.name.clone();
        let role = record.role;
        debug!(instance = %name, role = %role, ordinal = record.ordinal, "launching instance");

        let created = retry_with_backoff(&self.retry, "create_instance", cancel, || {
            self.provider.create_instance(&name, role, &spec)
        })
        .await;

        match created {
            Ok(instance_id) => {
                info!(
                    instance = %name,
                    instance_id = %instance_id,
                    role = %role,
                    ordinal = record.ordinal,
                    "instance launched"
                );
                record.mark_running(instance_id)?;
            }
            Err(mut e) => {
                if e.instance.is_none() {
                    e.instance = Some(name.clone());
                }
                warn!(
                    instance = %name,
                    role = %role,
                    ordinal = record.ordinal,
                    error = %e,
                    "instance launch failed, continuing with batch"
                );
                record.mark_failed(e)?;
            }
        }
        Ok(true)
    }

    async fn terminate_batch(
        &self,
        owned: &mut Vec<InstanceRecord>,
        targets: Vec<InstanceRecord>,
        cancel: &CancellationToken,
    ) -> Result<TerminateResult> {
        info!(count = targets.len(), "terminating instances");

        let mut entries = Vec::with_capacity(targets.len());
        for target in targets {
            let slot = owned.iter().position(|r| same_instance(r, &target));
            if slot.is_none() && !self.config.owns(&target.name) {
                warn!(instance = %target.name, "record belongs to another cluster, skipping");
                entries.push(TerminateEntry::skipped(target, SkipReason::NotOwned));
                continue;
            }

            let current = match slot {
                Some(i) => owned[i].clone(),
                None => target,
            };
            let entry = self.terminate_one(current, cancel).await?;
            match slot {
                Some(i) => owned[i] = entry.record.clone(),
                None => owned.push(entry.record.clone()),
            }
            entries.push(entry);
        }

        let result = TerminateResult::from_entries(entries);
        info!(
            outcome = ?result.outcome(),
            terminated = result.with_disposition(Disposition::Terminated).count(),
            failed = result.with_disposition(Disposition::Failed).count(),
            skipped = result.with_disposition(Disposition::Skipped).count(),
            "termination finished"
        );
        Ok(result)
    }

    async fn terminate_one(
        &self,
        mut record: InstanceRecord,
        cancel: &CancellationToken,
    ) -> Result<TerminateEntry> {
        if !record.is_running() {
            debug!(instance = %record.name, state = %record.state(), "not running, skipping");
            return Ok(TerminateEntry::skipped(record, SkipReason::NotRunning));
        }
        if cancel.is_cancelled() {
            debug!(instance = %record.name, "cancelled before terminate");
            return Ok(TerminateEntry::skipped(record, SkipReason::Cancelled));
        }

        record.transition(InstanceState::Terminating)?;
        let instance_id = record.instance_id.clone();

        let terminated = retry_with_backoff(&self.retry, "terminate_instance", cancel, || {
            self.provider.terminate_instance(&instance_id)
        })
        .await;

        match terminated {
            Ok(()) => {
                info!(instance = %record.name, instance_id = %instance_id, "instance terminated");
                record.mark_terminated()?;
                Ok(TerminateEntry::attempted(record, Disposition::Terminated))
            }
            Err(mut e) => {
                if e.instance.is_none() {
                    e.instance = Some(record.name.clone());
                }
                warn!(
                    instance = %record.name,
                    instance_id = %instance_id,
                    error = %e,
                    "instance termination failed, continuing with batch"
                );
                record.mark_failed(e)?;
                Ok(TerminateEntry::attempted(record, Disposition::Failed))
            }
        }
    }
}

/// Role and ordinal identify a record; names alone collide for workloads
/// that share one prefix between roles.
fn same_instance(a: &InstanceRecord, b: &InstanceRecord) -> bool {
    a.role == b.role && a.ordinal == b.ordinal && a.name == b.name
}
