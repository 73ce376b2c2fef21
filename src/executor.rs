use std::sync::Arc;
use std::time::Instant;

use rand::distributions::{Alphanumeric, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::model::{BenchmarkConfig, MixMode, OperationKind, OperationResult};
use crate::store::EndpointClient;

const VALUE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ";

/// Performs single timed operations against the resolved endpoints.
///
/// A failing store call never escapes `execute`: it becomes a failed [`OperationResult`].
pub struct OperationExecutor {
    config: Arc<BenchmarkConfig>,
    endpoints: Arc<Vec<EndpointClient>>,
    rng: StdRng,
    issued: u64,
}

impl OperationExecutor {
    pub fn new(config: Arc<BenchmarkConfig>, endpoints: Arc<Vec<EndpointClient>>) -> Self {
        Self::with_rng(config, endpoints, StdRng::from_entropy())
    }

    /// Executor with a reproducible key, value and mix sequence.
    pub fn with_seed(
        config: Arc<BenchmarkConfig>,
        endpoints: Arc<Vec<EndpointClient>>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, endpoints, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: Arc<BenchmarkConfig>,
        endpoints: Arc<Vec<EndpointClient>>,
        rng: StdRng,
    ) -> Self {
        Self {
            config,
            endpoints,
            rng,
            issued: 0,
        }
    }

    /// Run one operation against a uniformly chosen endpoint.
    pub fn step(&mut self) -> Option<OperationResult> {
        if self.endpoints.is_empty() {
            return None;
        }
        let endpoints = Arc::clone(&self.endpoints);
        let target = &endpoints[self.rng.gen_range(0..endpoints.len())];
        Some(self.execute(target))
    }

    /// Run one read or write against `target` and time it.
    pub fn execute(&mut self, target: &EndpointClient) -> OperationResult {
        let kind = self.next_kind();
        let key = self.random_key();

        let outcome = match kind {
            OperationKind::Write => {
                let value = self.random_value();
                let start = Instant::now();
                let outcome = target.client.put(&key, &value);
                (outcome, start.elapsed())
            }
            OperationKind::Read => {
                let start = Instant::now();
                let outcome = target.client.get(&key);
                (outcome, start.elapsed())
            }
        };

        match outcome {
            (Ok(()), latency) => OperationResult::success(kind, &target.endpoint, latency),
            (Err(e), latency) => {
                debug!(endpoint = %target.endpoint, %kind, error = %e, "operation failed");
                OperationResult::failure(kind, &target.endpoint, latency, e.to_string())
            }
        }
    }

    fn next_kind(&mut self) -> OperationKind {
        let n = self.issued;
        self.issued += 1;
        let ratio = self.config.write_ratio;

        let is_write = match self.config.mix {
            MixMode::Weighted => self.rng.gen_bool(ratio),
            MixMode::Interleaved => interleaved_is_write(n, ratio),
        };
        if is_write {
            OperationKind::Write
        } else {
            OperationKind::Read
        }
    }

    /// `<prefix>_<alphanumeric suffix>`, padded to the configured key size.
    fn random_key(&mut self) -> String {
        let prefix = &self.config.key_prefix;
        let suffix_len = self.config.key_size.saturating_sub(prefix.len() + 1);
        let suffix: String = (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(suffix_len)
            .map(char::from)
            .collect();
        format!("{}_{}", prefix, suffix)
    }

    fn random_value(&mut self) -> Vec<u8> {
        let pick = Uniform::from(0..VALUE_CHARSET.len());
        (0..self.config.value_size)
            .map(|_| VALUE_CHARSET[self.rng.sample(pick)])
            .collect()
    }
}

/// Operation `n` (0-based) is a write iff the running write quota `floor(k * ratio)`
/// increases at k = n + 1.
fn interleaved_is_write(n: u64, ratio: f64) -> bool {
    ((n + 1) as f64 * ratio).floor() > (n as f64 * ratio).floor()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::{KvClient, StoreError};

    #[derive(Default)]
    struct RecordingClient {
        keys: Mutex<Vec<String>>,
        values: Mutex<Vec<usize>>,
    }

    impl KvClient for RecordingClient {
        fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            self.keys.lock().unwrap().push(key.to_string());
            self.values.lock().unwrap().push(value.len());
            Ok(())
        }

        fn get(&self, key: &str) -> Result<(), StoreError> {
            self.keys.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    struct BrokenClient;

    impl KvClient for BrokenClient {
        fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Other("connection refused".to_string()))
        }

        fn get(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Other("connection refused".to_string()))
        }
    }

    fn executor(config: BenchmarkConfig, client: Arc<dyn KvClient>) -> OperationExecutor {
        let endpoints = vec![EndpointClient {
            endpoint: "node-1".to_string(),
            client,
        }];
        OperationExecutor::with_seed(Arc::new(config), Arc::new(endpoints), 7)
    }

    #[test]
    fn test_interleaved_rule_is_exact() {
        let writes = (0..1000).filter(|&n| interleaved_is_write(n, 0.7)).count();
        assert!((699..=700).contains(&writes));
        assert_eq!((0..10).filter(|&n| interleaved_is_write(n, 0.0)).count(), 0);
        assert_eq!((0..10).filter(|&n| interleaved_is_write(n, 1.0)).count(), 10);
    }

    #[test]
    fn test_key_and_value_sizes() {
        let client = Arc::new(RecordingClient::default());
        let config = BenchmarkConfig {
            write_ratio: 1.0,
            key_size: 32,
            value_size: 128,
            ..BenchmarkConfig::default()
        };
        let mut exec = executor(config, client.clone());
        for _ in 0..5 {
            assert!(exec.step().unwrap().is_success());
        }
        for key in client.keys.lock().unwrap().iter() {
            assert_eq!(key.len(), 32);
            assert!(key.starts_with("benchmark_"));
        }
        assert!(client.values.lock().unwrap().iter().all(|&len| len == 128));
    }

    #[test]
    fn test_failure_becomes_data() {
        let mut exec = executor(BenchmarkConfig::default(), Arc::new(BrokenClient));
        let result = exec.step().unwrap();
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert_eq!(result.endpoint, "node-1");
    }

    #[test]
    fn test_read_only_ratio() {
        let config = BenchmarkConfig {
            write_ratio: 0.0,
            ..BenchmarkConfig::default()
        };
        let mut exec = executor(config, Arc::new(RecordingClient::default()));
        assert!((0..50).all(|_| exec.step().unwrap().kind == OperationKind::Read));
    }

    #[test]
    fn test_no_endpoints() {
        let mut exec = OperationExecutor::new(
            Arc::new(BenchmarkConfig::default()),
            Arc::new(Vec::new()),
        );
        assert!(exec.step().is_none());
    }
}
