//! Run orchestration: endpoint resolution, warmup, the timed phase and the progress observer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::{BenchError, Result};
use crate::executor::OperationExecutor;
use crate::model::{BenchmarkConfig, BenchmarkResults, OperationResult};
use crate::stats;
use crate::store::{Connector, EndpointClient};
use crate::worker::{StopSignal, Worker};

/// Endpoints resolved for one run. Produced by [`Orchestrator::prepare_run`].
pub struct RunHandle {
    endpoints: Arc<Vec<EndpointClient>>,
}

impl RunHandle {
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.endpoint.as_str())
    }
}

/// Everything the timed phase produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Measured wall time, which can exceed the nominal duration.
    pub elapsed: Duration,
    pub results: Vec<OperationResult>,
}

/// Drives a single run. Once its stop signal has been raised the orchestrator refuses to
/// prepare another run; build a new one instead.
pub struct Orchestrator<C> {
    config: Arc<BenchmarkConfig>,
    connector: C,
    stop: StopSignal,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(config: BenchmarkConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector,
            stop: StopSignal::new(),
        })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Handle that cancels the run from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Resolve every endpoint, drop the unreachable ones and warm the cluster up.
    pub fn prepare_run(&self) -> Result<RunHandle> {
        if self.stop.is_stopped() {
            return Err(BenchError::Setup(
                "orchestrator was stopped, a new one is needed for another run".to_string(),
            ));
        }
        let mut resolved = Vec::with_capacity(self.config.endpoints.len());
        for endpoint in &self.config.endpoints {
            match self.connector.connect(endpoint) {
                Ok(client) => resolved.push(EndpointClient {
                    endpoint: endpoint.clone(),
                    client,
                }),
                Err(e) => warn!(endpoint = %endpoint, error = %e, "endpoint unreachable, skipping"),
            }
        }
        if resolved.is_empty() {
            return Err(BenchError::Setup(format!(
                "none of the {} configured endpoints is reachable",
                self.config.endpoints.len()
            )));
        }
        info!(
            reachable = resolved.len(),
            configured = self.config.endpoints.len(),
            "endpoints resolved"
        );

        let handle = RunHandle {
            endpoints: Arc::new(resolved),
        };
        if self.config.warmup_ops > 0 {
            info!(operations = self.config.warmup_ops, "warming up");
            let mut warmup = Worker::new(0, self.executor(&handle), self.stop.clone());
            warmup.warmup(self.config.warmup_ops);
        }
        Ok(handle)
    }

    /// Start one worker per client plus the progress observer and wait for all of them.
    pub fn execute(&self, handle: RunHandle) -> Result<RunOutcome> {
        let duration = self.config.duration();
        let clients = self.config.num_clients;
        info!(clients, duration_secs = self.config.duration, "starting benchmark");

        let mut handles: Vec<JoinHandle<Vec<OperationResult>>> = Vec::with_capacity(clients);
        let mut counters = Vec::with_capacity(clients);
        let start = Instant::now();

        for id in 0..clients {
            let worker = Worker::new(id, self.executor(&handle), self.stop.clone())
                .with_rate_limit(self.config.qps_per_client)
                .with_max_ops(self.config.ops_per_client);
            counters.push(worker.progress());

            let spawned = thread::Builder::new()
                .name(format!("worker-{:0>4}", worker.id()))
                .spawn(move || worker.run(duration));
            match spawned {
                Ok(h) => handles.push(h),
                Err(e) => {
                    // let the workers already running drain before reporting
                    self.stop.stop();
                    let _ = join_workers(handles);
                    return Err(e.into());
                }
            }
        }

        let (done_tx, done_rx) = mpsc::channel::<()>();
        let observer = self.config.report_interval().and_then(|interval| {
            spawn_observer(counters, start, duration, interval, done_rx)
                .map_err(|e| warn!(error = %e, "progress reporting disabled"))
                .ok()
        });

        let joined = join_workers(handles);
        let elapsed = start.elapsed();

        drop(done_tx);
        if let Some(observer) = observer {
            let _ = observer.join();
        }

        let results = joined?;
        info!(
            elapsed_secs = elapsed.as_secs_f64(),
            operations = results.len(),
            "benchmark completed"
        );
        Ok(RunOutcome { elapsed, results })
    }

    /// Prepare, execute and aggregate one run.
    pub fn run(&self) -> Result<BenchmarkResults> {
        let handle = self.prepare_run()?;
        let outcome = self.execute(handle)?;
        stats::aggregate(&outcome.results, outcome.elapsed)
    }

    fn executor(&self, handle: &RunHandle) -> OperationExecutor {
        OperationExecutor::new(Arc::clone(&self.config), Arc::clone(&handle.endpoints))
    }
}

/// Join every worker and merge their buffers. All workers are joined even if one panicked.
fn join_workers(handles: Vec<JoinHandle<Vec<OperationResult>>>) -> Result<Vec<OperationResult>> {
    let mut merged = Vec::new();
    let mut panicked = None;
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(mut results) => merged.append(&mut results),
            Err(_) => {
                error!(worker = id, "worker panicked");
                panicked.get_or_insert(id);
            }
        }
    }
    match panicked {
        Some(id) => Err(BenchError::Worker(id)),
        None => Ok(merged),
    }
}

/// Periodically log aggregate progress until `done` is disconnected.
fn spawn_observer(
    counters: Vec<Arc<AtomicU64>>,
    start: Instant,
    nominal: Duration,
    interval: Duration,
    done: Receiver<()>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || loop {
            match done.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let operations: u64 = counters.iter().map(|c| c.load(Ordering::Relaxed)).sum();
                    let elapsed = start.elapsed().as_secs_f64();
                    let ops_per_sec = if elapsed > 0.0 {
                        operations as f64 / elapsed
                    } else {
                        0.0
                    };
                    info!(
                        elapsed = %format!("{:.0}s / {}s", elapsed, nominal.as_secs()),
                        operations,
                        ops_per_sec = %format!("{:.1}", ops_per_sec),
                        "progress"
                    );
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvClient, StoreError};

    struct OkClient;

    impl KvClient for OkClient {
        fn put(&self, _key: &str, _value: &[u8]) -> std::result::Result<(), StoreError> {
            Ok(())
        }

        fn get(&self, _key: &str) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    /// Endpoints whose name starts with "down" are unreachable.
    struct TestConnector;

    impl Connector for TestConnector {
        fn connect(&self, endpoint: &str) -> std::result::Result<Arc<dyn KvClient>, StoreError> {
            if endpoint.starts_with("down") {
                Err(StoreError::Unreachable(endpoint.to_string()))
            } else {
                Ok(Arc::new(OkClient))
            }
        }
    }

    fn config(endpoints: &[&str]) -> BenchmarkConfig {
        BenchmarkConfig {
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            num_clients: 2,
            duration: 60,
            warmup_ops: 0,
            report_interval: 0,
            ops_per_client: Some(20),
            ..BenchmarkConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = BenchmarkConfig {
            num_clients: 0,
            ..config(&["up-1"])
        };
        assert!(matches!(
            Orchestrator::new(cfg, TestConnector),
            Err(BenchError::Setup(_))
        ));
    }

    #[test]
    fn test_prepare_drops_unreachable() {
        let orch = Orchestrator::new(config(&["up-1", "down-1", "up-2"]), TestConnector).unwrap();
        let handle = orch.prepare_run().unwrap();
        assert_eq!(handle.endpoints().collect::<Vec<_>>(), vec!["up-1", "up-2"]);
    }

    #[test]
    fn test_prepare_fails_without_reachable_endpoint() {
        let orch = Orchestrator::new(config(&["down-1", "down-2"]), TestConnector).unwrap();
        assert!(matches!(orch.prepare_run(), Err(BenchError::Setup(_))));
    }

    #[test]
    fn test_stopped_orchestrator_refuses_next_run() {
        let orch = Orchestrator::new(config(&["up-1"]), TestConnector).unwrap();
        assert!(orch.run().is_ok());
        orch.stop_signal().stop();
        assert!(matches!(orch.prepare_run(), Err(BenchError::Setup(_))));
        assert!(matches!(orch.run(), Err(BenchError::Setup(_))));
    }

    #[test]
    fn test_execute_merges_all_workers() {
        let orch = Orchestrator::new(config(&["up-1", "down-1"]), TestConnector).unwrap();
        let handle = orch.prepare_run().unwrap();
        let outcome = orch.execute(handle).unwrap();
        assert_eq!(outcome.results.len(), 40);
        assert!(outcome.results.iter().all(|r| r.endpoint == "up-1"));
    }

    #[test]
    fn test_observer_runs_and_exits() {
        let cfg = BenchmarkConfig {
            duration: 1,
            ops_per_client: None,
            report_interval: 1,
            ..config(&["up-1"])
        };
        let orch = Orchestrator::new(cfg, TestConnector).unwrap();
        let handle = orch.prepare_run().unwrap();
        let outcome = orch.execute(handle).unwrap();
        assert!(outcome.elapsed >= Duration::from_secs(1));
    }

    #[test]
    fn test_join_reports_panicked_worker() {
        let handles = vec![
            thread::spawn(Vec::new),
            thread::spawn(|| -> Vec<OperationResult> { panic!("worker failure") }),
        ];
        assert!(matches!(join_workers(handles), Err(BenchError::Worker(1))));
    }
}
