//! Names command - preview generated instance name prefixes
//!
//! Usage: onion names --workload <type> [--count <n>]

use clap::Args;
use serde::Serialize;

use onion_cluster::{new_prefixes, Prefixes, WorkloadType};

use super::format::print_table;
use super::OutputFormat;
use crate::{Error, Result};

/// Print freshly generated name prefixes
#[derive(Args, Debug)]
pub struct NamesArgs {
    /// Workload type (kubernetes, openshift, or any other value)
    #[arg(short, long, env = "ONION_WORKLOAD")]
    pub workload: String,

    /// Number of prefix sets to generate
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[derive(Serialize)]
struct NamesReport<'a> {
    workload: &'a WorkloadType,
    prefixes: &'a [Prefixes],
}

pub fn run(args: NamesArgs) -> Result<()> {
    let workload = WorkloadType::parse(&args.workload);
    if workload.is_empty() {
        return Err(Error::validation("--workload must not be empty"));
    }

    let prefixes = generate(&workload, args.count);
    match args.output {
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = prefixes
                .iter()
                .map(|p| vec![p.token.clone(), p.master.clone(), p.node.clone()])
                .collect();
            print_table(&["TOKEN", "MASTER PREFIX", "NODE PREFIX"], &rows);
        }
        OutputFormat::Json => {
            let report = NamesReport {
                workload: &workload,
                prefixes: &prefixes,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn generate(workload: &WorkloadType, count: usize) -> Vec<Prefixes> {
    (0..count).map(|_| new_prefixes(workload)).collect()
}
