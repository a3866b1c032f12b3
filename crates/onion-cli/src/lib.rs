//! Onion CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};

use onion_common::telemetry::LogFormat;

/// Onion - cluster instance provisioning
#[derive(Parser, Debug)]
#[command(name = "onion")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log line format (logs go to stderr)
    #[arg(long, value_enum, default_value_t, env = "ONION_LOG_FORMAT", global = true)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a cluster, report it and optionally tear it down
    Provision(commands::provision::ProvisionArgs),
    /// Print freshly generated name prefixes
    Names(commands::names::NamesArgs),
}

/// Log line format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Provision(args) => commands::provision::run(args).await,
            Commands::Names(args) => commands::names::run(args),
        }
    }
}
