//! Provision command - run one provisioning campaign
//!
//! Usage: onion provision --workload <type> [--masters n] [--nodes n] [--teardown]
//!
//! The campaign:
//! 1. Builds the cluster spec from `--file` and flags (flags win)
//! 2. Provisions masters, then nodes
//! 3. Reconciles the records against the provider's view
//! 4. With `--teardown`, terminates everything that reached `running`
//!
//! Ctrl-C cancels the campaign: calls already issued complete, nothing new
//! is started. The command fails when any step's outcome is not complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use onion_cluster::{
    ClusterManager, ClusterSpec, InMemoryProvider, LaunchStrategy, Outcome, Prefixes,
    ProviderClient, ProvisionResult, Reconciliation, TerminateResult,
};
use onion_common::retry::RetryConfig;
use onion_common::CredentialRef;

use super::format::{print_table, record_rows, terminate_rows, RECORD_HEADERS, TERMINATE_HEADERS};
use super::OutputFormat;
use crate::{Error, Result};

/// Provision a cluster, report it and optionally tear it down
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// YAML cluster file holding a cluster spec; flags override its values
    #[arg(short, long, env = "ONION_CLUSTER_FILE")]
    pub file: Option<PathBuf>,

    /// Workload type (kubernetes, openshift, or any other value)
    #[arg(short, long, env = "ONION_WORKLOAD")]
    pub workload: Option<String>,

    /// Number of master instances
    #[arg(long, env = "ONION_MASTERS")]
    pub masters: Option<u32>,

    /// Number of node instances
    #[arg(long, env = "ONION_NODES")]
    pub nodes: Option<u32>,

    /// Provider region
    #[arg(long, env = "ONION_REGION")]
    pub region: Option<String>,

    /// Instance type for all instances
    #[arg(long, env = "ONION_INSTANCE_TYPE")]
    pub instance_type: Option<String>,

    /// Credential profile or secret name handed to the provider
    /// (default: $ONION_CREDENTIAL_REF, then $AWS_PROFILE, then "default")
    #[arg(long)]
    pub credential_ref: Option<String>,

    /// Provider to provision against
    #[arg(long, value_enum, default_value_t, env = "ONION_PROVIDER")]
    pub provider: ProviderKind,

    /// How instances within one role are launched
    #[arg(long, value_enum, default_value_t, env = "ONION_STRATEGY")]
    pub strategy: StrategyArg,

    /// Extra attempts for each provider call that fails transiently
    #[arg(long, default_value_t = 0, env = "ONION_RETRIES")]
    pub retries: u32,

    /// Terminate all running instances once provisioning is reported
    #[arg(long)]
    pub teardown: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

/// Built-in provider implementations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// In-process provider, nothing leaves the machine
    #[default]
    Memory,
}

impl ProviderKind {
    fn build(self) -> Arc<dyn ProviderClient> {
        match self {
            ProviderKind::Memory => Arc::new(InMemoryProvider::new()),
        }
    }
}

/// Launch strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// One create call at a time (default)
    #[default]
    Sequential,
    /// All instances of a role at once, masters before nodes
    Parallel,
}

impl From<StrategyArg> for LaunchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => LaunchStrategy::Sequential,
            StrategyArg::Parallel => LaunchStrategy::ParallelPerRole,
        }
    }
}

impl ProvisionArgs {
    /// Merge the cluster file (if any) with explicit flags
    pub fn cluster_spec(&self) -> Result<ClusterSpec> {
        let mut spec = match (&self.file, &self.workload) {
            (Some(path), _) => load_cluster_file(path)?,
            (None, Some(workload)) => {
                ClusterSpec::new(workload.as_str()).with_credential_ref(CredentialRef::from_env())
            }
            (None, None) => {
                return Err(Error::validation(
                    "either --workload or --file must be given",
                ))
            }
        };

        if let (Some(_), Some(workload)) = (&self.file, &self.workload) {
            spec.workload_type = workload.as_str().into();
        }
        if let Some(masters) = self.masters {
            spec.master_count = masters;
        }
        if let Some(nodes) = self.nodes {
            spec.node_count = nodes;
        }
        if let Some(ref region) = self.region {
            spec.region = region.clone();
        }
        if let Some(ref instance_type) = self.instance_type {
            spec.instance_type = instance_type.clone();
        }
        if let Some(ref credential_ref) = self.credential_ref {
            spec.credential_ref = CredentialRef::new(credential_ref.as_str());
        }
        Ok(spec)
    }

    /// Per-call retry policy
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.retries.saturating_add(1))
    }
}

/// Read a cluster file
///
/// A file without `credentialRef` takes the credential from the environment.
fn load_cluster_file(path: &Path) -> Result<ClusterSpec> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::ClusterFile {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    let has_credential = value.get("credentialRef").is_some();

    let mut spec: ClusterSpec = serde_yaml::from_value(value)?;
    if !has_credential {
        spec.credential_ref = CredentialRef::from_env();
    }
    Ok(spec)
}

#[derive(Serialize)]
struct CampaignReport<'a> {
    prefixes: &'a Prefixes,
    provision: &'a ProvisionResult,
    reconciliation: &'a Reconciliation,
    #[serde(skip_serializing_if = "Option::is_none")]
    teardown: Option<&'a TerminateResult>,
}

pub async fn run(args: ProvisionArgs) -> Result<()> {
    let spec = args.cluster_spec()?;
    let manager = ClusterManager::new(spec, args.provider.build())?
        .with_strategy(args.strategy.into())
        .with_retry(args.retry_config());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let campaign = run_campaign(&manager, &args, &cancel).await;
    interrupt.abort();
    campaign
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling campaign");
        cancel.cancel();
    }
}

async fn run_campaign(
    manager: &ClusterManager,
    args: &ProvisionArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = manager.config();
    info!(
        cluster = %config.token(),
        master_prefix = %config.master_prefix(),
        node_prefix = %config.node_prefix(),
        provider = ?args.provider,
        "starting campaign"
    );

    let provisioned = manager.provision(cancel).await?;
    if args.output == OutputFormat::Table {
        println!(
            "Cluster {} ({}): provisioning {}",
            config.token(),
            config.workload_type(),
            provisioned.outcome()
        );
        print_table(RECORD_HEADERS, &record_rows(provisioned.records()));
    }

    let reconciliation = manager.reconcile().await?;
    if args.output == OutputFormat::Table {
        println!();
        println!(
            "Provider reports {} instance(s): {} master, {} node, {} untracked, {} missing",
            reconciliation.owned_count(),
            reconciliation.masters.len(),
            reconciliation.nodes.len(),
            reconciliation.untracked.len(),
            reconciliation.missing.len()
        );
    }

    let teardown = if args.teardown {
        let terminated = manager.terminate_all(cancel).await?;
        if args.output == OutputFormat::Table {
            println!();
            println!("Teardown: {}", terminated.outcome());
            print_table(TERMINATE_HEADERS, &terminate_rows(terminated.entries()));
        }
        Some(terminated)
    } else {
        None
    };

    if args.output == OutputFormat::Json {
        let report = CampaignReport {
            prefixes: config.prefixes(),
            provision: &provisioned,
            reconciliation: &reconciliation,
            teardown: teardown.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    check_outcome("provisioning", provisioned.outcome())?;
    if let Some(ref terminated) = teardown {
        check_outcome("teardown", terminated.outcome())?;
    }
    Ok(())
}

fn check_outcome(operation: &'static str, outcome: Outcome) -> Result<()> {
    if outcome == Outcome::Complete {
        Ok(())
    } else {
        Err(Error::incomplete(operation, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands};
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> ProvisionArgs {
        let mut argv = vec!["onion", "provision"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Provision(args) => args,
            other => panic!("expected provision command, got {:?}", other),
        }
    }

    #[test]
    fn test_flag_defaults() {
        let args = parse(&["--workload", "kubernetes"]);
        assert_eq!(args.provider, ProviderKind::Memory);
        assert_eq!(args.strategy, StrategyArg::Sequential);
        assert_eq!(args.output, OutputFormat::Table);
        assert_eq!(args.retries, 0);
        assert!(!args.teardown);

        let spec = args.cluster_spec().unwrap();
        assert_eq!(spec.master_count, 1);
        assert_eq!(spec.node_count, 2);
        assert_eq!(spec.region, "us-west-2");
        assert_eq!(args.retry_config().max_attempts, 1);
    }

    #[test]
    fn test_flags_build_spec() {
        let args = parse(&[
            "-w",
            "openshift",
            "--masters",
            "3",
            "--nodes",
            "5",
            "--region",
            "eu-central-1",
            "--credential-ref",
            "prod",
            "--strategy",
            "parallel",
            "--retries",
            "2",
            "--teardown",
            "-o",
            "json",
        ]);
        let spec = args.cluster_spec().unwrap();
        assert_eq!(spec.workload_type.as_str(), "openshift");
        assert_eq!(spec.master_count, 3);
        assert_eq!(spec.node_count, 5);
        assert_eq!(spec.region, "eu-central-1");
        assert_eq!(spec.credential_ref.expose(), "prod");
        assert_eq!(LaunchStrategy::from(args.strategy), LaunchStrategy::ParallelPerRole);
        assert_eq!(args.retry_config().max_attempts, 3);
        assert!(args.teardown);
    }

    #[test]
    fn test_workload_or_file_is_required() {
        let args = parse(&["--masters", "2"]);
        assert!(matches!(args.cluster_spec(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_flags_override_cluster_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "workloadType: kubernetes\nmasterCount: 3\nnodeCount: 4\nregion: ap-south-1\ncredentialRef: from-file\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap();
        let args = parse(&["--file", path, "--nodes", "1"]);
        let spec = args.cluster_spec().unwrap();
        assert_eq!(spec.master_count, 3);
        assert_eq!(spec.node_count, 1);
        assert_eq!(spec.region, "ap-south-1");
        assert_eq!(spec.credential_ref.expose(), "from-file");
    }

    #[test]
    fn test_missing_cluster_file_is_reported_with_path() {
        let args = parse(&["--file", "/nonexistent/cluster.yaml"]);
        let err = args.cluster_spec().unwrap_err();
        assert!(matches!(err, Error::ClusterFile { .. }));
        assert!(err.to_string().contains("/nonexistent/cluster.yaml"));
    }

    #[test]
    fn test_invalid_cluster_file_is_a_yaml_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "masterCount: [not, a, number]").unwrap();
        let args = parse(&["--file", file.path().to_str().unwrap()]);
        assert!(matches!(args.cluster_spec(), Err(Error::Yaml(_))));
    }

    #[tokio::test]
    async fn test_campaign_against_memory_provider_succeeds() {
        let args = parse(&["-w", "kubernetes", "--teardown", "-o", "json"]);
        run(args).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_counts_fail_before_provisioning() {
        let args = parse(&["-w", "kubernetes", "--masters", "0"]);
        let err = run(args).await.unwrap_err();
        assert!(matches!(err, Error::Cluster(onion_common::Error::Config { .. })));
    }

    #[test]
    fn test_incomplete_outcome_is_an_error() {
        assert!(check_outcome("provisioning", Outcome::Complete).is_ok());
        let err = check_outcome("teardown", Outcome::Partial).unwrap_err();
        assert_eq!(err.to_string(), "teardown finished with outcome partial");
    }
}
