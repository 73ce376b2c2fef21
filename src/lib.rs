//! Load generator and scalability analysis for a distributed key-value cluster.
//!
//! A run drives a configurable read/write mix from many concurrent clients against a set
//! of endpoints, records every operation and reduces the records to throughput, latency
//! percentiles and error summaries. Runs at several cluster sizes can then be fitted to
//! the Universal Scalability Law.

pub mod analysis;
pub mod bench;
pub mod cmd;
pub mod consts;
pub mod error;
pub mod executor;
pub mod latency;
pub mod model;
pub mod report;
pub mod stats;
pub mod store;
pub mod usl;
pub mod worker;

pub use bench::{Orchestrator, RunHandle, RunOutcome};
pub use error::{BenchError, FitError, Result};
pub use model::{
    BenchmarkConfig, BenchmarkResults, LatencyStats, MixMode, OperationKind, OperationResult,
    ResultDocument,
};
pub use store::{Connector, KvClient, StoreError};
pub use usl::{FitOptions, ScalabilityDataset, UslFitResult};
pub use worker::{StopSignal, Worker};
