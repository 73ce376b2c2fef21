use std::time::Duration;

/// Root znode under which every benchmark key is created.
pub const BENCH_ROOT: &str = "/kvstore_bench";

/// Delay between two operations of the same worker.
pub const PACING_DELAY: Duration = Duration::from_millis(1);

/// Delay between two warmup operations.
pub const WARMUP_PACING: Duration = Duration::from_millis(10);

/// Session timeout used when connecting to an endpoint.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive connection attempts before an endpoint is considered unreachable.
pub const CONNECT_RETRIES: u32 = 10;

/// First port probed by endpoint auto-detection, and how many ports follow it.
pub const DETECT_BASE_PORT: u16 = 2181;
pub const DETECT_PORT_COUNT: u16 = 10;

/// Node-count horizon swept when looking for the optimal cluster size.
pub const DEFAULT_HORIZON: u32 = 20;

/// Residual evaluations the scalability solver may spend.
pub const FIT_MAX_EVALUATIONS: usize = 10_000;
