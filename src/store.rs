//! Store client capability and connection management.
//!
//! The benchmark only needs `put` and `get` against one cluster member. Anything that
//! can do that implements [`KvClient`]; a [`Connector`] turns an endpoint address into
//! such a client. The ZooKeeper implementation stores every key as a znode under
//! [`BENCH_ROOT`].

use std::sync::Arc;
use std::thread;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};
use zookeeper_zk::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZooKeeper, ZooKeeperExt};

use crate::consts::{BENCH_ROOT, CONNECT_RETRIES, SESSION_TIMEOUT};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Zk(#[from] ZkError),

    #[error("endpoint {0} is unreachable")]
    Unreachable(String),

    #[error("{0}")]
    Other(String),
}

/// One connection to one cluster member.
pub trait KvClient: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Reading a key that does not exist is not an error.
    fn get(&self, key: &str) -> Result<(), StoreError>;
}

/// Resolves an endpoint address into a usable client.
pub trait Connector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn KvClient>, StoreError>;
}

/// A resolved endpoint: its address and the client bound to it.
#[derive(Clone)]
pub struct EndpointClient {
    pub endpoint: String,
    pub client: Arc<dyn KvClient>,
}

struct LoggingWatcher;

impl Watcher for LoggingWatcher {
    fn handle(&self, e: WatchedEvent) {
        debug!(event = ?e, "zookeeper event");
    }
}

fn znode_path(key: &str) -> String {
    format!("{}/{}", BENCH_ROOT, key)
}

/// `KvClient` backed by a ZooKeeper session.
pub struct ZkClient {
    zk: ZooKeeper,
}

impl ZkClient {
    pub fn new(zk: ZooKeeper) -> Self {
        Self { zk }
    }
}

impl KvClient for ZkClient {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = znode_path(key);
        match self.zk.create(
            &path,
            value.to_vec(),
            Acl::open_unsafe().clone(),
            CreateMode::Persistent,
        ) {
            Ok(_) => Ok(()),
            Err(ZkError::NodeExists) => {
                self.zk.set_data(&path, value.to_vec(), None)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, key: &str) -> Result<(), StoreError> {
        match self.zk.get_data(&znode_path(key), false) {
            Ok(_) | Err(ZkError::NoNode) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ZkClient {
    fn drop(&mut self) {
        let _ = self.zk.close();
    }
}

/// Connects to ZooKeeper endpoints, retrying a bounded number of times.
#[derive(Debug, Clone)]
pub struct ZkConnector {
    retries: u32,
}

impl Default for ZkConnector {
    fn default() -> Self {
        Self {
            retries: CONNECT_RETRIES,
        }
    }
}

impl ZkConnector {
    /// A connector that gives up after `retries` attempts.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries: retries.max(1),
        }
    }
}

impl Connector for ZkConnector {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn KvClient>, StoreError> {
        let zk = connect_zk(endpoint, self.retries)?;
        // a session is only known to be usable once a request round-trips
        zk.ensure_path(BENCH_ROOT)?;
        Ok(Arc::new(ZkClient::new(zk)))
    }
}

/// Connect to ZooKeeper, retrying with a short random backoff.
pub fn connect_zk(addr: &str, retries: u32) -> Result<ZooKeeper, StoreError> {
    let mut attempt = 0;
    let mut rng = rand::thread_rng();
    loop {
        match ZooKeeper::connect(addr, SESSION_TIMEOUT, LoggingWatcher) {
            Ok(zk) => return Ok(zk),
            Err(e) => {
                attempt += 1;
                debug!(endpoint = addr, attempt, error = %e, "connection attempt failed");
                if attempt >= retries {
                    return Err(e.into());
                }
                thread::sleep(std::time::Duration::from_millis(rng.gen_range(10..200)));
            }
        }
    }
}

/// Probe `host:base_port .. host:base_port+count` and return the endpoints that accept a connection.
pub fn detect_endpoints<C: Connector>(
    connector: &C,
    host: &str,
    base_port: u16,
    count: u16,
) -> Vec<String> {
    (0..count)
        .filter_map(|offset| base_port.checked_add(offset))
        .map(|port| format!("{}:{}", host, port))
        .filter(|endpoint| match connector.connect(endpoint) {
            Ok(_) => {
                info!(endpoint = %endpoint, "detected cluster member");
                true
            }
            Err(_) => false,
        })
        .collect()
}

/// Remove everything the benchmark wrote under the benchmark root.
pub fn clean(endpoint: &str) -> Result<(), StoreError> {
    let zk = connect_zk(endpoint, CONNECT_RETRIES)?;
    let result = match zk.delete_recursive(BENCH_ROOT) {
        Ok(_) | Err(ZkError::NoNode) => {
            info!(root = BENCH_ROOT, endpoint, "benchmark data removed");
            Ok(())
        }
        Err(e) => {
            warn!(root = BENCH_ROOT, endpoint, error = %e, "failed to remove benchmark data");
            Err(e.into())
        }
    };
    let _ = zk.close();
    result
}
