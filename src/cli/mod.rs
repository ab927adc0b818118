// CLI module for callgate
// Author: kelexine (https://github.com/kelexine)

pub mod simulate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use simulate::{run_simulation, SimulationReport};

/// callgate - request resilience and concurrency control for outbound calls
#[derive(Parser, Debug)]
#[command(name = "callgate", version, about, long_about = None)]
pub struct Args {
    /// Config file to load instead of ~/.callgate/config.toml
    #[arg(long, short, global = true, env = "CALLGATE_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the effective configuration as TOML
    Config,
    /// Drive the pipeline with a synthetic outbound call and print statistics
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of guarded calls to issue concurrently
    #[arg(long, default_value_t = 50)]
    pub requests: usize,

    /// Fail every Kth execution with a server error (0 disables failures)
    #[arg(long, default_value_t = 0)]
    pub fail_every: usize,

    /// Simulated latency of each outbound call
    #[arg(long, default_value_t = 20)]
    pub latency_ms: u64,

    /// Number of distinct cache keys the calls cycle through (0 disables caching)
    #[arg(long, default_value_t = 10)]
    pub distinct_keys: usize,

    /// Also print the prometheus text exposition
    #[arg(long)]
    pub metrics: bool,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            requests: 50,
            fail_every: 0,
            latency_ms: 20,
            distinct_keys: 10,
            metrics: false,
        }
    }
}
