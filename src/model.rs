use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// How the executor decides between a read and a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MixMode {
    /// Independent draw per operation, write with probability `write_ratio`.
    #[default]
    Weighted,
    /// Deterministic: the first k operations contain exactly floor(k * write_ratio) writes.
    Interleaved,
}

/// Parameters of one benchmark run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub endpoints: Vec<String>,
    pub num_clients: usize,
    /// Nominal run length in seconds.
    pub duration: u64,
    pub write_ratio: f64,
    /// Total key length, `<key_prefix>_` included. Must leave room for at least one
    /// random character after the prefix.
    pub key_size: usize,
    pub value_size: usize,
    pub key_prefix: String,
    pub warmup_ops: usize,
    /// Seconds between two progress reports, 0 disables them.
    pub report_interval: u64,
    #[serde(default)]
    pub mix: MixMode,
    /// Optional cap on the operations one client performs.
    #[serde(default)]
    pub ops_per_client: Option<u64>,
    /// Per-client rate limit, 0 means unlimited.
    #[serde(default)]
    pub qps_per_client: u64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            num_clients: 10,
            duration: 30,
            write_ratio: 0.3,
            key_size: 64,
            value_size: 1024,
            key_prefix: "benchmark".to_string(),
            warmup_ops: 100,
            report_interval: 5,
            mix: MixMode::Weighted,
            ops_per_client: None,
            qps_per_client: 0,
        }
    }
}

impl BenchmarkConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn report_interval(&self) -> Option<Duration> {
        (self.report_interval > 0).then(|| Duration::from_secs(self.report_interval))
    }

    /// Reject configurations that cannot describe a run.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(BenchError::Setup("no endpoints configured".to_string()));
        }
        if self.num_clients == 0 {
            return Err(BenchError::Setup("client count must be at least 1".to_string()));
        }
        if self.key_size < self.key_prefix.len() + 2 {
            return Err(BenchError::Setup(format!(
                "key size {} leaves no room for a random suffix after prefix {:?}",
                self.key_size, self.key_prefix
            )));
        }
        if !(0.0..=1.0).contains(&self.write_ratio) {
            return Err(BenchError::Setup(format!(
                "write ratio must be within [0, 1], got {}",
                self.write_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => f.write_str("read"),
            OperationKind::Write => f.write_str("write"),
        }
    }
}

/// Outcome of a single read or write.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    /// `None` for a successful operation, the failure text otherwise.
    pub error: Option<String>,
}

impl OperationResult {
    pub fn success(kind: OperationKind, endpoint: &str, latency: Duration) -> Self {
        Self {
            kind,
            latency,
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            error: None,
        }
    }

    /// An empty error text is replaced by `"<kind> failed"` so every failure names a cause.
    pub fn failure(
        kind: OperationKind,
        endpoint: &str,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = format!("{} failed", kind);
        }
        Self {
            kind,
            latency,
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_nanos() as f64 / 1_000_000.0
    }
}

/// Latency summary in milliseconds. All zero for an empty sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResults {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub total_reads: u64,
    pub total_writes: u64,
    pub successful_reads: u64,
    pub successful_writes: u64,
    pub duration_seconds: f64,
    pub throughput_ops_per_sec: f64,
    pub read_throughput: f64,
    pub write_throughput: f64,
    pub latency: LatencyStats,
    pub read_latency: LatencyStats,
    pub write_latency: LatencyStats,
    pub endpoint_distribution: BTreeMap<String, u64>,
    pub errors: BTreeSet<String>,
}

/// What is written to disk after a run: the results plus the config that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    #[serde(flatten)]
    pub results: BenchmarkResults,
    pub config: BenchmarkConfig,
    pub timestamp: DateTime<Utc>,
}

impl ResultDocument {
    pub fn new(results: BenchmarkResults, config: BenchmarkConfig) -> Self {
        Self {
            results,
            config,
            timestamp: Utc::now(),
        }
    }
}
