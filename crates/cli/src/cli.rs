//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use contracts::DispatchMode;

/// Batch Relay - rate-paced batch forwarding to a limited downstream service
#[derive(Parser, Debug)]
#[command(
    name = "batch-relay",
    author,
    version,
    about = "Rate-paced batch relay",
    long_about = "Slices a batch into chunks no larger than the service limit and \n\
                  forwards them at one chunk per period, sequentially or with one \n\
                  task per chunk. `run` drives a simulated service from config."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BATCH_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "BATCH_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a synthetic batch against the simulated service
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration and the planned chunk layout
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "relay.toml", env = "BATCH_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Override number of items in the batch
    #[arg(long, env = "BATCH_RELAY_ITEMS")]
    pub items: Option<usize>,

    /// Override dispatch mode
    #[arg(long, value_enum, env = "BATCH_RELAY_MODE")]
    pub mode: Option<ModeArg>,

    /// Override service limit (items per period)
    #[arg(long, env = "BATCH_RELAY_LIMIT")]
    pub limit: Option<u64>,

    /// Override service period in milliseconds
    #[arg(long, env = "BATCH_RELAY_PERIOD_MS")]
    pub period_ms: Option<u64>,

    /// Override simulated processing latency in milliseconds
    #[arg(long, env = "BATCH_RELAY_LATENCY_MS")]
    pub latency_ms: Option<u64>,

    /// Override cap on concurrently running chunk tasks
    #[arg(long, env = "BATCH_RELAY_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Give up after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "BATCH_RELAY_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without dispatching
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BATCH_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// List every chunk range
    #[arg(long)]
    pub chunks: bool,
}

/// Dispatch mode as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// One chunk at a time
    Sequential,
    /// One task per chunk
    Parallel,
}

impl From<ModeArg> for DispatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => DispatchMode::Sequential,
            ModeArg::Parallel => DispatchMode::Parallel,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
