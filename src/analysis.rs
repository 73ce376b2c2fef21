//! Scalability analysis across runs at different cluster sizes.
//!
//! Result documents are discovered by file name (`results-<N>nodes.json`), one workload
//! category at a time is turned into a [`ScalabilityDataset`] and fitted. Categories that
//! cannot be fitted are left out of the report.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::model::{BenchmarkResults, ResultDocument};
use crate::report;
use crate::usl::{self, Bottleneck, FitOptions, MeasuredPoint, ScalabilityDataset, UslFitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workload {
    Overall,
    Reads,
    Writes,
}

impl Workload {
    pub const ALL: [Workload; 3] = [Workload::Overall, Workload::Reads, Workload::Writes];

    pub fn name(&self) -> &'static str {
        match self {
            Workload::Overall => "Overall",
            Workload::Reads => "Reads",
            Workload::Writes => "Writes",
        }
    }

    pub fn throughput(&self, results: &BenchmarkResults) -> f64 {
        match self {
            Workload::Overall => results.throughput_ops_per_sec,
            Workload::Reads => results.read_throughput,
            Workload::Writes => results.write_throughput,
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Node count encoded in a file name such as `results-3nodes.json` or `results-1node.json`.
pub fn node_count_from_path(path: &Path) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"results-(\d+)nodes?\.json$").expect("node count pattern is valid")
    });
    let name = path.file_name()?.to_str()?;
    pattern.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Load every readable result document whose name carries a node count.
pub fn load_documents(paths: &[PathBuf]) -> BTreeMap<u32, ResultDocument> {
    let mut documents = BTreeMap::new();
    for path in paths {
        let Some(nodes) = node_count_from_path(path) else {
            warn!(path = %path.display(), "no node count in file name, skipping");
            continue;
        };
        match report::load_document(path) {
            Ok(doc) => {
                documents.insert(nodes, doc);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to load result document"),
        }
    }
    info!(cluster_sizes = documents.len(), "result documents loaded");
    documents
}

pub fn dataset_for(documents: &BTreeMap<u32, ResultDocument>, workload: Workload) -> ScalabilityDataset {
    documents
        .iter()
        .map(|(&nodes, doc)| (nodes, workload.throughput(&doc.results)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkloadAnalysis {
    pub workload: Workload,
    pub fit: UslFitResult,
}

/// Fit every workload category. Categories whose fit fails are logged and omitted.
pub fn analyze(documents: &BTreeMap<u32, ResultDocument>, options: &FitOptions) -> Vec<WorkloadAnalysis> {
    Workload::ALL
        .into_iter()
        .filter_map(|workload| {
            match usl::fit_with(&dataset_for(documents, workload), options) {
                Ok(fit) => Some(WorkloadAnalysis { workload, fit }),
                Err(e) => {
                    warn!(%workload, error = %e, "workload omitted from scalability report");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    Moderate,
    High,
}

pub fn contention_level(alpha: f64) -> Level {
    if alpha < 0.1 {
        Level::Low
    } else if alpha < 0.3 {
        Level::Moderate
    } else {
        Level::High
    }
}

pub fn coherency_level(beta: f64) -> Level {
    if beta < 0.01 {
        Level::Low
    } else if beta < 0.05 {
        Level::Moderate
    } else {
        Level::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assessment {
    Excellent,
    Good,
    Limited,
    Poor,
}

/// Overall verdict from the combined overhead α + β.
pub fn assess(alpha: f64, beta: f64) -> Assessment {
    let overhead = alpha + beta;
    if overhead < 0.1 {
        Assessment::Excellent
    } else if overhead < 0.3 {
        Assessment::Good
    } else if overhead < 0.5 {
        Assessment::Limited
    } else {
        Assessment::Poor
    }
}

fn fit_quality(r_squared: f64) -> &'static str {
    if r_squared > 0.9 {
        "Excellent fit: model explains data very well"
    } else if r_squared > 0.7 {
        "Good fit: model explains data reasonably well"
    } else {
        "Poor fit: model may not capture system behavior"
    }
}

fn contention_note(level: Level) -> &'static str {
    match level {
        Level::Low => "Low contention: good serialization characteristics",
        Level::Moderate => "Moderate contention: some serialization bottlenecks",
        Level::High => "High contention: significant serialization bottlenecks",
    }
}

fn coherency_note(level: Level) -> &'static str {
    match level {
        Level::Low => "Low coherency delay: minimal coordination overhead",
        Level::Moderate => "Moderate coherency delay: some coordination overhead",
        Level::High => "High coherency delay: significant coordination overhead",
    }
}

fn assessment_note(assessment: Assessment) -> &'static str {
    match assessment {
        Assessment::Excellent => "Excellent scalability",
        Assessment::Good => "Good scalability with some limitations",
        Assessment::Limited => "Limited scalability",
        Assessment::Poor => "Poor scalability",
    }
}

/// Human-readable report over every fitted workload.
pub struct UslReport<'a> {
    analyses: &'a [WorkloadAnalysis],
}

impl<'a> UslReport<'a> {
    pub fn new(analyses: &'a [WorkloadAnalysis]) -> Self {
        Self { analyses }
    }
}

impl fmt::Display for UslReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        let thin = "-".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "UNIVERSAL SCALABILITY LAW ANALYSIS REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(f)?;

        if self.analyses.is_empty() {
            writeln!(f, "No workload could be fitted.")?;
            return Ok(());
        }

        let count = self.analyses.len() as f64;
        let avg_alpha = self.analyses.iter().map(|a| a.fit.alpha).sum::<f64>() / count;
        let avg_beta = self.analyses.iter().map(|a| a.fit.beta).sum::<f64>() / count;

        writeln!(f, "EXECUTIVE SUMMARY")?;
        writeln!(f, "{}", thin)?;
        writeln!(f, "Average Contention Coefficient (α): {:.4}", avg_alpha)?;
        writeln!(f, "Average Coherency Coefficient (β): {:.4}", avg_beta)?;
        writeln!(f)?;
        match Bottleneck::classify(avg_alpha, avg_beta) {
            Bottleneck::CoherencyLimited => {
                writeln!(f, "SYSTEM CHARACTERISTIC: Coherency-Limited")?;
                writeln!(f, "The system is primarily limited by coordination overhead between nodes.")?;
            }
            Bottleneck::ContentionLimited => {
                writeln!(f, "SYSTEM CHARACTERISTIC: Contention-Limited")?;
                writeln!(f, "The system is primarily limited by serialization bottlenecks.")?;
            }
        }
        writeln!(f, "Overall Assessment: {}", assessment_note(assess(avg_alpha, avg_beta)))?;
        writeln!(f)?;

        for analysis in self.analyses {
            let fit = &analysis.fit;
            writeln!(f, "{} ANALYSIS", analysis.workload.name().to_uppercase())?;
            writeln!(f, "{}", thin)?;
            writeln!(f, "Model Fit Quality (R²): {:.4}", fit.r_squared)?;
            writeln!(f, "  -> {}", fit_quality(fit.r_squared))?;
            writeln!(f)?;
            writeln!(f, "Contention (α): {:.4} ± {:.4}", fit.alpha, fit.alpha_err)?;
            writeln!(f, "  -> {}", contention_note(contention_level(fit.alpha)))?;
            writeln!(f, "Coherency (β): {:.4} ± {:.4}", fit.beta, fit.beta_err)?;
            writeln!(f, "  -> {}", coherency_note(coherency_level(fit.beta)))?;
            match fit.bottleneck() {
                Bottleneck::CoherencyLimited => {
                    writeln!(f, "β > α: coherency-limited (coordination overhead dominates)")?
                }
                Bottleneck::ContentionLimited => {
                    writeln!(f, "α ≥ β: contention-limited (serialization dominates)")?
                }
            }
            writeln!(f)?;
            writeln!(f, "Predicted Optimal Cluster Size: {} nodes", fit.optimal_nodes)?;
            writeln!(f, "Maximum Relative Capacity: {:.2}x", fit.max_capacity)?;
            writeln!(f)?;
            writeln!(f, "Efficiency Analysis:")?;
            for point in &fit.measured {
                writeln!(
                    f,
                    "  {} nodes: {:.1}% efficiency ({:.2}x capacity)",
                    point.nodes,
                    point.efficiency() * 100.0,
                    point.relative_capacity
                )?;
            }
            writeln!(f)?;
            if fit.optimum_reached() {
                writeln!(
                    f,
                    "RECOMMENDATION: optimal cluster size ({} nodes) reached or exceeded",
                    fit.optimal_nodes
                )?;
                writeln!(f, "   Adding more nodes will decrease performance")?;
            } else {
                writeln!(
                    f,
                    "RECOMMENDATION: can scale up to {} nodes for optimal performance",
                    fit.optimal_nodes
                )?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub nodes: u32,
    pub capacity: f64,
}

/// Numeric data for plotting one workload's curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSeries {
    pub workload: Workload,
    pub alpha: f64,
    pub beta: f64,
    pub r_squared: f64,
    pub optimal_nodes: u32,
    pub max_capacity: f64,
    pub bottleneck: Bottleneck,
    pub predicted: Vec<SeriesPoint>,
    pub measured: Vec<MeasuredPoint>,
}

pub fn series(analyses: &[WorkloadAnalysis]) -> Vec<WorkloadSeries> {
    analyses
        .iter()
        .map(|a| WorkloadSeries {
            workload: a.workload,
            alpha: a.fit.alpha,
            beta: a.fit.beta,
            r_squared: a.fit.r_squared,
            optimal_nodes: a.fit.optimal_nodes,
            max_capacity: a.fit.max_capacity,
            bottleneck: a.fit.bottleneck(),
            predicted: a
                .fit
                .predictions()
                .into_iter()
                .map(|(nodes, capacity)| SeriesPoint { nodes, capacity })
                .collect(),
            measured: a.fit.measured.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BenchmarkConfig;

    fn document(overall: f64, reads: f64, writes: f64) -> ResultDocument {
        let results = BenchmarkResults {
            throughput_ops_per_sec: overall,
            read_throughput: reads,
            write_throughput: writes,
            ..BenchmarkResults::default()
        };
        ResultDocument::new(results, BenchmarkConfig::default())
    }

    #[test]
    fn test_node_count_from_path() {
        assert_eq!(node_count_from_path(Path::new("out/results-3nodes.json")), Some(3));
        assert_eq!(node_count_from_path(Path::new("results-1node.json")), Some(1));
        assert_eq!(node_count_from_path(Path::new("results.json")), None);
        assert_eq!(node_count_from_path(Path::new("results-3nodes.json.bak")), None);
    }

    #[test]
    fn test_analyze_omits_unfittable_workload() {
        let documents: BTreeMap<u32, ResultDocument> = [
            (1, document(100.0, 70.0, 0.0)),
            (3, document(250.0, 180.0, 0.0)),
            (5, document(350.0, 240.0, 0.0)),
        ]
        .into_iter()
        .collect();

        let analyses = analyze(&documents, &FitOptions::default());
        let workloads: Vec<_> = analyses.iter().map(|a| a.workload).collect();
        assert_eq!(workloads, vec![Workload::Overall, Workload::Reads]);
    }

    #[test]
    fn test_levels_and_assessment() {
        assert_eq!(contention_level(0.05), Level::Low);
        assert_eq!(contention_level(0.2), Level::Moderate);
        assert_eq!(contention_level(0.5), Level::High);
        assert_eq!(coherency_level(0.001), Level::Low);
        assert_eq!(coherency_level(0.02), Level::Moderate);
        assert_eq!(coherency_level(0.2), Level::High);
        assert_eq!(assess(0.02, 0.01), Assessment::Excellent);
        assert_eq!(assess(0.2, 0.05), Assessment::Good);
        assert_eq!(assess(0.3, 0.1), Assessment::Limited);
        assert_eq!(assess(0.6, 0.1), Assessment::Poor);
    }

    #[test]
    fn test_report_mentions_recommendation() {
        let documents: BTreeMap<u32, ResultDocument> = [
            (1, document(100.0, 0.0, 0.0)),
            (3, document(250.0, 0.0, 0.0)),
            (5, document(350.0, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();
        let analyses = analyze(&documents, &FitOptions::default());
        let text = UslReport::new(&analyses).to_string();
        assert!(text.contains("OVERALL ANALYSIS"));
        assert!(text.contains("Contention-Limited"));
        assert!(text.contains("can scale up to"));
        assert!(!text.contains("READS ANALYSIS"));
    }

    #[test]
    fn test_empty_report() {
        let text = UslReport::new(&[]).to_string();
        assert!(text.contains("No workload could be fitted."));
    }

    #[test]
    fn test_series_covers_horizon() {
        let documents: BTreeMap<u32, ResultDocument> = [
            (1, document(100.0, 0.0, 0.0)),
            (2, document(180.0, 0.0, 0.0)),
            (4, document(300.0, 0.0, 0.0)),
        ]
        .into_iter()
        .collect();
        let options = FitOptions {
            horizon: 12,
            ..FitOptions::default()
        };
        let analyses = analyze(&documents, &options);
        let series = series(&analyses);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].predicted.len(), 12);
        assert_eq!(series[0].measured.len(), 3);
        assert_eq!(series[0].predicted[0].capacity, 1.0);
    }
}
