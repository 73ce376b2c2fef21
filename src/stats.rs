//! Aggregation of raw operation results into a [`BenchmarkResults`] record.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::model::{BenchmarkResults, LatencyStats, OperationKind, OperationResult};

/// `count / seconds`, or 0 when no time elapsed.
fn rate(count: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        count as f64 / seconds
    } else {
        0.0
    }
}

/// Reduce every result of a run to counts, throughputs and latency statistics.
///
/// Latency statistics only consider successful operations. The result is independent of
/// the order of `results`.
pub fn aggregate(results: &[OperationResult], elapsed: Duration) -> Result<BenchmarkResults> {
    if results.is_empty() {
        return Err(BenchError::Aggregation("no results to analyze".to_string()));
    }

    let mut out = BenchmarkResults {
        total_operations: results.len() as u64,
        duration_seconds: elapsed.as_secs_f64(),
        ..BenchmarkResults::default()
    };

    let mut all = Vec::new();
    let mut reads = Vec::new();
    let mut writes = Vec::new();
    let mut endpoints: BTreeMap<String, u64> = BTreeMap::new();
    let mut errors = BTreeSet::new();

    for r in results {
        *endpoints.entry(r.endpoint.clone()).or_default() += 1;
        match r.kind {
            OperationKind::Read => out.total_reads += 1,
            OperationKind::Write => out.total_writes += 1,
        }

        match r.error {
            None => {
                out.successful_operations += 1;
                let ms = r.latency_ms();
                all.push(ms);
                match r.kind {
                    OperationKind::Read => {
                        out.successful_reads += 1;
                        reads.push(ms);
                    }
                    OperationKind::Write => {
                        out.successful_writes += 1;
                        writes.push(ms);
                    }
                }
            }
            Some(ref message) => {
                out.failed_operations += 1;
                errors.insert(message.clone());
            }
        }
    }

    let secs = out.duration_seconds;
    out.throughput_ops_per_sec = rate(out.successful_operations, secs);
    out.read_throughput = rate(out.successful_reads, secs);
    out.write_throughput = rate(out.successful_writes, secs);

    out.latency = LatencyStats::from_samples(all);
    out.read_latency = LatencyStats::from_samples(reads);
    out.write_latency = LatencyStats::from_samples(writes);

    out.endpoint_distribution = endpoints;
    out.errors = errors;
    Ok(out)
}
