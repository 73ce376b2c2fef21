use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::consts::{PACING_DELAY, WARMUP_PACING};
use crate::executor::OperationExecutor;
use crate::model::OperationResult;

/// Cooperative cancellation shared by every worker of a run.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every worker to finish its in-flight operation and return.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One benchmark client. Owns its result buffer; nobody else writes to it.
pub struct Worker {
    id: usize,
    executor: OperationExecutor,
    results: Vec<OperationResult>,
    completed: Arc<AtomicU64>,
    stop: StopSignal,
    limiter: Option<ratelimit::Ratelimiter>,
    max_ops: Option<u64>,
}

impl Worker {
    pub fn new(id: usize, executor: OperationExecutor, stop: StopSignal) -> Self {
        Self {
            id,
            executor,
            results: Vec::new(),
            completed: Arc::new(AtomicU64::new(0)),
            stop,
            limiter: None,
            max_ops: None,
        }
    }

    /// Cap this worker at `qps` operations per second.
    pub fn with_rate_limit(mut self, qps: u64) -> Self {
        if qps > 0 {
            self.limiter = Some(ratelimit::Ratelimiter::new(50, 1, qps));
        }
        self
    }

    /// Stop after `max_ops` operations even if time remains.
    pub fn with_max_ops(mut self, max_ops: Option<u64>) -> Self {
        self.max_ops = max_ops;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Monotonic count of finished operations, safe to read while the worker runs.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.completed)
    }

    /// Loop until `duration` has elapsed, the operation cap is reached, or the stop
    /// signal is observed. Returns the collected results.
    pub fn run(mut self, duration: Duration) -> Vec<OperationResult> {
        let start = Instant::now();
        loop {
            if self.stop.is_stopped() || start.elapsed() >= duration {
                break;
            }
            if self.max_ops.is_some_and(|max| self.results.len() as u64 >= max) {
                break;
            }
            if let Some(ref l) = self.limiter {
                l.wait();
            }

            let Some(result) = self.executor.step() else {
                break;
            };
            self.results.push(result);
            self.completed.fetch_add(1, Ordering::Relaxed);

            thread::sleep(PACING_DELAY);
        }
        self.results
    }

    /// Run `count` operations and throw the results away.
    pub fn warmup(&mut self, count: usize) {
        for _ in 0..count {
            if self.stop.is_stopped() {
                break;
            }
            let _ = self.executor.step();
            thread::sleep(WARMUP_PACING);
        }
    }
}
