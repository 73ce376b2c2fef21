use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::consts::DEFAULT_HORIZON;
use crate::model::{BenchmarkConfig, MixMode};

#[derive(Parser, Clone)]
#[command(name = "kvstore-benchmark")]
#[command(version)]
#[command(about = "distributed key-value store benchmark and scalability analysis tool", long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Drive a read/write mix against the cluster and report statistics
    Run(RunArgs),
    /// Fit the scalability model over result files of several cluster sizes
    Usl(UslArgs),
    /// Delete the data written by previous runs
    Clean(CleanArgs),
}

#[derive(Args, serde::Serialize, Clone)]
pub struct RunArgs {
    /// Cluster endpoints, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub endpoints: Vec<String>,
    /// Probe local ports for cluster members when no endpoint is given
    #[arg(long)]
    pub auto_detect: bool,
    #[arg(short, long, default_value_t = 10)]
    pub clients: usize,
    /// Benchmark duration in seconds
    #[arg(short, long, default_value_t = 30)]
    pub duration: u64,
    /// Share of write operations, 0.0 - 1.0
    #[arg(short, long, default_value_t = 0.3)]
    pub write_ratio: f64,
    #[arg(long, default_value_t = 64)]
    pub key_size: usize,
    #[arg(long, default_value_t = 1024)]
    pub value_size: usize,
    #[arg(long, default_value = "benchmark")]
    pub key_prefix: String,
    /// Unmeasured operations run before the timed phase
    #[arg(long, default_value_t = 100)]
    pub warmup_ops: usize,
    /// Seconds between progress reports, 0 disables them
    #[arg(long, default_value_t = 5)]
    pub report_interval: u64,
    #[arg(long, value_enum, default_value_t = MixMode::Weighted)]
    pub mix: MixMode,
    /// Stop each client after this many operations
    #[arg(long)]
    pub ops_per_client: Option<u64>,
    /// Rate limit per client, 0 means unlimited
    #[arg(long, default_value_t = 0)]
    pub qps_per_client: u64,
    /// Write the result document to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    pub fn to_config(&self) -> BenchmarkConfig {
        BenchmarkConfig {
            endpoints: self.endpoints.clone(),
            num_clients: self.clients,
            duration: self.duration,
            write_ratio: self.write_ratio,
            key_size: self.key_size,
            value_size: self.value_size,
            key_prefix: self.key_prefix.clone(),
            warmup_ops: self.warmup_ops,
            report_interval: self.report_interval,
            mix: self.mix,
            ops_per_client: self.ops_per_client,
            qps_per_client: self.qps_per_client,
        }
    }
}

#[derive(Args, Clone)]
pub struct UslArgs {
    /// Result documents named results-<N>nodes.json
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Largest node count considered for the optimum
    #[arg(long, default_value_t = DEFAULT_HORIZON)]
    pub horizon: u32,
    /// Write the text report to this file
    #[arg(short, long, default_value = "usl_report.txt")]
    pub report: PathBuf,
    /// Write the fitted curves as JSON to this file
    #[arg(short, long)]
    pub series: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct CleanArgs {
    #[arg(short, long, default_value = "127.0.0.1:2181")]
    pub endpoint: String,
}
