//! Onion CLI
//!
//! Provisions cluster instances against a cloud provider.

use clap::Parser;

use onion_cli::{Cli, Result};
use onion_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        service_name: "onion".to_string(),
        format: cli.log_format.into(),
    })?;

    cli.run().await
}
