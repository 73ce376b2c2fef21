use std::fs;
use std::path::Path;

use tracing::info;

use crate::analysis::WorkloadAnalysis;
use crate::error::Result;
use crate::model::{BenchmarkResults, LatencyStats, ResultDocument};

/// Unique errors shown in the console summary; the saved document keeps all of them.
const MAX_ERRORS_SHOWN: usize = 5;

fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn print_latency(title: &str, stats: &LatencyStats) {
    println!("\n{}", title);
    println!("Average: {:.2}ms", stats.avg);
    println!("P50: {:.2}ms", stats.p50);
    println!("P95: {:.2}ms", stats.p95);
    println!("P99: {:.2}ms", stats.p99);
}

pub fn print_results(r: &BenchmarkResults) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("KEY-VALUE CLUSTER BENCHMARK RESULTS");
    println!("{}", rule);

    println!("\nOVERVIEW");
    println!("Duration: {:.2}s", r.duration_seconds);
    println!("Total Operations: {}", r.total_operations);
    println!(
        "Successful Operations: {} ({:.1}%)",
        r.successful_operations,
        share(r.successful_operations, r.total_operations)
    );
    println!("Failed Operations: {}", r.failed_operations);

    println!("\nTHROUGHPUT");
    println!("Overall: {:.1} ops/sec", r.throughput_ops_per_sec);
    println!("Read Throughput: {:.1} reads/sec", r.read_throughput);
    println!("Write Throughput: {:.1} writes/sec", r.write_throughput);

    println!("\nLATENCY (ms)");
    println!("Average: {:.2}ms", r.latency.avg);
    println!("Min: {:.2}ms", r.latency.min);
    println!("Max: {:.2}ms", r.latency.max);
    println!("P50: {:.2}ms", r.latency.p50);
    println!("P95: {:.2}ms", r.latency.p95);
    println!("P99: {:.2}ms", r.latency.p99);

    if r.successful_reads > 0 {
        print_latency("READ LATENCY (ms)", &r.read_latency);
    }
    if r.successful_writes > 0 {
        print_latency("WRITE LATENCY (ms)", &r.write_latency);
    }

    println!("\nENDPOINT DISTRIBUTION");
    for (endpoint, count) in &r.endpoint_distribution {
        println!(
            "{}: {} operations ({:.1}%)",
            endpoint,
            count,
            share(*count, r.total_operations)
        );
    }

    if !r.errors.is_empty() {
        println!("\nERRORS ({} unique)", r.errors.len());
        for (i, error) in r.errors.iter().take(MAX_ERRORS_SHOWN).enumerate() {
            println!("{}. {}", i + 1, error);
        }
        if r.errors.len() > MAX_ERRORS_SHOWN {
            println!("... and {} more", r.errors.len() - MAX_ERRORS_SHOWN);
        }
    }
    println!("\n{}", rule);
}

/// Write the result document as pretty JSON.
pub fn save_document(path: &Path, document: &ResultDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    fs::write(path, json)?;
    info!(path = %path.display(), "results saved");
    Ok(())
}

pub fn load_document(path: &Path) -> Result<ResultDocument> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Short per-workload summary for the console.
pub fn print_usl_summary(analyses: &[WorkloadAnalysis]) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("QUICK USL ANALYSIS SUMMARY");
    println!("{}", rule);
    for a in analyses {
        println!("\n{}:", a.workload);
        println!("  Contention (α): {:.4}", a.fit.alpha);
        println!("  Coherency (β): {:.4}", a.fit.beta);
        println!("  Model Fit (R²): {:.4}", a.fit.r_squared);
        println!("  Optimal Nodes: {}", a.fit.optimal_nodes);
        println!("  Max Capacity: {:.2}x", a.fit.max_capacity);
        match a.fit.bottleneck() {
            crate::usl::Bottleneck::CoherencyLimited => {
                println!("  Bottleneck: Coordination overhead (β > α)")
            }
            crate::usl::Bottleneck::ContentionLimited => {
                println!("  Bottleneck: Serialization (α ≥ β)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::BenchmarkConfig;

    #[test]
    fn test_share_handles_zero_total() {
        assert_eq!(share(0, 0), 0.0);
        assert_eq!(share(1, 4), 25.0);
    }

    #[test]
    fn test_document_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results-3nodes.json");

        let mut results = BenchmarkResults {
            total_operations: 10,
            successful_operations: 9,
            failed_operations: 1,
            throughput_ops_per_sec: 4.5,
            ..BenchmarkResults::default()
        };
        results.endpoint_distribution.insert("node-1:2181".to_string(), 10);
        results.errors.insert("connection refused".to_string());
        let config = BenchmarkConfig {
            endpoints: vec!["node-1:2181".to_string()],
            ..BenchmarkConfig::default()
        };
        let doc = ResultDocument::new(results, config);

        save_document(&path, &doc).unwrap();
        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded, doc);
    }
}
