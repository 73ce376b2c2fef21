//! Error types for kvstore-benchmark

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BenchError {
    /// The run cannot start: bad configuration or no reachable endpoint.
    #[error("setup error: {0}")]
    Setup(String),

    /// Nothing was measured, so there is nothing to report.
    #[error("aggregation precondition failed: {0}")]
    Aggregation(String),

    #[error("fit error: {0}")]
    Fit(#[from] FitError),

    #[error("worker {0} panicked")]
    Worker(usize),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a scalability fit produces no coefficients.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("need at least 3 distinct node counts, got {distinct}")]
    Underdetermined { distinct: usize },

    #[error("dataset has no single-node baseline sample")]
    MissingBaseline,

    #[error("single-node baseline must be positive, got {0}")]
    InvalidBaseline(f64),

    #[error("throughput at {nodes} nodes must be finite and non-negative, got {throughput}")]
    InvalidSample { nodes: u32, throughput: f64 },

    #[error("optimizer did not converge within {evaluations} evaluations")]
    Divergence { evaluations: usize },
}

pub type Result<T> = std::result::Result<T, BenchError>;
