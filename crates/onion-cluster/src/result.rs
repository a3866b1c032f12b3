//! Batch results returned to callers
//!
//! A partial batch is not an error. Every result enumerates each instance
//! and its final state, and callers decide whether to retry or roll back.

use std::fmt;

use serde::Serialize;

use crate::config::{ClusterConfig, TAG_ROLE};
use crate::instance::{InstanceRecord, InstanceState, Role};
use crate::provider::{InstanceInfo, ProviderInstanceState};

/// Overall outcome of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every instance reached its target state
    Complete,
    /// Some instances did, some did not, or the batch was cancelled
    Partial,
    /// No attempted instance reached its target state
    Failed,
}

impl Outcome {
    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Complete => "complete",
            Outcome::Partial => "partial",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one provisioning batch
#[derive(Clone, Debug, Serialize)]
pub struct ProvisionResult {
    outcome: Outcome,
    cancelled: bool,
    records: Vec<InstanceRecord>,
}

impl ProvisionResult {
    /// Aggregate a finished batch
    ///
    /// Records still `pending` were never attempted, which only happens when
    /// the batch was cancelled.
    pub(crate) fn from_records(records: Vec<InstanceRecord>) -> Self {
        let running = records.iter().filter(|r| r.is_running()).count();
        let cancelled = records
            .iter()
            .any(|r| r.state() == InstanceState::Pending);

        let outcome = if cancelled {
            Outcome::Partial
        } else if running == records.len() {
            Outcome::Complete
        } else if running > 0 {
            Outcome::Partial
        } else {
            Outcome::Failed
        };

        Self {
            outcome,
            cancelled,
            records,
        }
    }

    /// Overall outcome
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Whether the batch stopped early on cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// All records, masters first, each role in ordinal order
    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    /// Records of one role
    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &InstanceRecord> {
        self.records.iter().filter(move |r| r.role == role)
    }

    /// Master records
    pub fn masters(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.by_role(Role::Master)
    }

    /// Node records
    pub fn nodes(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.by_role(Role::Node)
    }

    /// Records that reached `running`
    pub fn running(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.records.iter().filter(|r| r.is_running())
    }

    /// Records that ended in `failed`
    pub fn failed(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.records
            .iter()
            .filter(|r| r.state() == InstanceState::Failed)
    }

    /// Consume the result, keeping the records
    pub fn into_records(self) -> Vec<InstanceRecord> {
        self.records
    }
}

/// What happened to one record in a terminate batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Provider acknowledged termination
    Terminated,
    /// Terminate call failed
    Failed,
    /// No call was issued
    Skipped,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Disposition::Terminated => "terminated",
            Disposition::Failed => "failed",
            Disposition::Skipped => "skipped",
        })
    }
}

/// Why a record was skipped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Record was not `running`
    NotRunning,
    /// Record's name is outside this manager's prefixes
    NotOwned,
    /// Batch was cancelled before reaching the record
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotRunning => "not_running",
            SkipReason::NotOwned => "not_owned",
            SkipReason::Cancelled => "cancelled",
        })
    }
}

/// One record's entry in a terminate batch
#[derive(Clone, Debug, Serialize)]
pub struct TerminateEntry {
    /// Record after the batch
    pub record: InstanceRecord,
    /// What happened to it
    pub disposition: Disposition,
    /// Set when `disposition` is `skipped`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl TerminateEntry {
    pub(crate) fn skipped(record: InstanceRecord, reason: SkipReason) -> Self {
        Self {
            record,
            disposition: Disposition::Skipped,
            skip_reason: Some(reason),
        }
    }

    pub(crate) fn attempted(record: InstanceRecord, disposition: Disposition) -> Self {
        Self {
            record,
            disposition,
            skip_reason: None,
        }
    }
}

/// Result of one terminate batch
#[derive(Clone, Debug, Serialize)]
pub struct TerminateResult {
    outcome: Outcome,
    cancelled: bool,
    entries: Vec<TerminateEntry>,
}

impl TerminateResult {
    /// Aggregate a finished batch
    ///
    /// Skipped records do not count against the outcome. A batch where
    /// nothing needed terminating is complete.
    pub(crate) fn from_entries(entries: Vec<TerminateEntry>) -> Self {
        let count = |d: Disposition| entries.iter().filter(|e| e.disposition == d).count();
        let terminated = count(Disposition::Terminated);
        let failed = count(Disposition::Failed);
        let cancelled = entries
            .iter()
            .any(|e| e.skip_reason == Some(SkipReason::Cancelled));

        let outcome = if cancelled {
            Outcome::Partial
        } else if failed == 0 {
            Outcome::Complete
        } else if terminated > 0 {
            Outcome::Partial
        } else {
            Outcome::Failed
        };

        Self {
            outcome,
            cancelled,
            entries,
        }
    }

    /// Overall outcome
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Whether the batch stopped early on cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// One entry per record passed in, in the same order
    pub fn entries(&self) -> &[TerminateEntry] {
        &self.entries
    }

    /// Entries with the given disposition
    pub fn with_disposition(&self, disposition: Disposition) -> impl Iterator<Item = &TerminateEntry> {
        self.entries
            .iter()
            .filter(move |e| e.disposition == disposition)
    }
}

/// Provider-observed instances matched against a manager's records
#[derive(Clone, Debug, Default, Serialize)]
pub struct Reconciliation {
    /// Owned instances identified as masters
    pub masters: Vec<InstanceInfo>,
    /// Owned instances identified as nodes
    pub nodes: Vec<InstanceInfo>,
    /// Owned instances whose role cannot be told from name or tags
    pub unclassified: Vec<InstanceInfo>,
    /// Owned instances the manager holds no record for
    pub untracked: Vec<InstanceInfo>,
    /// Running records the provider no longer reports as live
    pub missing: Vec<InstanceRecord>,
}

impl Reconciliation {
    /// Match observed instances against the manager's records
    ///
    /// Instances outside the cluster's name prefixes are ignored even if the
    /// provider returned them.
    pub(crate) fn build(
        config: &ClusterConfig,
        observed: Vec<InstanceInfo>,
        records: &[InstanceRecord],
    ) -> Self {
        let mut reconciliation = Self::default();

        let live_ids: Vec<&str> = observed
            .iter()
            .filter(|info| config.owns(&info.name))
            .filter(|info| info.state != ProviderInstanceState::Terminated)
            .map(|info| info.instance_id.as_str())
            .collect();
        reconciliation.missing = records
            .iter()
            .filter(|r| r.is_running() && !live_ids.contains(&r.instance_id.as_str()))
            .cloned()
            .collect();

        for info in observed.into_iter().filter(|info| config.owns(&info.name)) {
            let tracked = records
                .iter()
                .any(|r| !r.instance_id.is_empty() && r.instance_id == info.instance_id);
            if !tracked {
                reconciliation.untracked.push(info.clone());
            }
            match classify(config, &info) {
                Some(Role::Master) => reconciliation.masters.push(info),
                Some(Role::Node) => reconciliation.nodes.push(info),
                None => reconciliation.unclassified.push(info),
            }
        }

        reconciliation
    }

    /// Number of owned instances the provider reported
    pub fn owned_count(&self) -> usize {
        self.masters.len() + self.nodes.len() + self.unclassified.len()
    }

    /// Whether records and provider agree
    pub fn is_consistent(&self) -> bool {
        self.untracked.is_empty() && self.missing.is_empty()
    }
}

/// Role from the role tag, else from the name prefix when the prefixes differ
fn classify(config: &ClusterConfig, info: &InstanceInfo) -> Option<Role> {
    match info.tags.get(TAG_ROLE).map(String::as_str) {
        Some("master") => return Some(Role::Master),
        Some("node") => return Some(Role::Node),
        _ => {}
    }
    if config.master_prefix() == config.node_prefix() {
        None
    } else if info.name.starts_with(config.master_prefix()) {
        Some(Role::Master)
    } else if info.name.starts_with(config.node_prefix()) {
        Some(Role::Node)
    } else {
        None
    }
}
