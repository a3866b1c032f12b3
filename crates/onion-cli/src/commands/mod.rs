//! CLI commands

pub mod format;
pub mod names;
pub mod provision;

use clap::ValueEnum;

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Columnar table (default)
    #[default]
    Table,
    /// JSON
    Json,
}
