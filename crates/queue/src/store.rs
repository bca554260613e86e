//! Batch payload store.
//!
//! Appends opaque payload records under a list key and atomically pops
//! them all on drain. The store never interprets payloads or keys; key
//! layout (`payload:job:<category>:<batch-key>`) is the engine's
//! business.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::QueueError;

/// Trait for batch store backends.
///
/// Guarantees: `append` is atomic; `drain` removes exactly what was
/// present at the moment of observation, so appends racing a drain are
/// kept for the next one. Within a key, append order is preserved.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Append one payload to the list under `key`.
    async fn append(&self, key: &str, payload: Vec<u8>) -> Result<(), QueueError>;

    /// Atomically remove and return every payload under `key`.
    /// Returns an empty vec if the list is absent.
    async fn drain(&self, key: &str) -> Result<Vec<Vec<u8>>, QueueError>;

    /// Whether any payload is currently stored under `key`.
    ///
    /// Informational only: the answer may be stale by the time the
    /// caller acts on it. Never use it as a correctness gate.
    async fn exists(&self, key: &str) -> Result<bool, QueueError>;
}

/// In-process batch store backed by a mutex-guarded map.
///
/// The shared-keyspace equivalent for single-process deployments and
/// tests; a networked backend implements the same trait.
#[derive(Default)]
pub struct MemoryBatchStore {
    lists: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn append(&self, key: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().await;
        lists.entry(key.to_string()).or_default().push(payload);
        Ok(())
    }

    async fn drain(&self, key: &str) -> Result<Vec<Vec<u8>>, QueueError> {
        let mut lists = self.lists.lock().await;
        Ok(lists.remove(key).unwrap_or_default())
    }

    async fn exists(&self, key: &str) -> Result<bool, QueueError> {
        let lists = self.lists.lock().await;
        Ok(lists.get(key).is_some_and(|l| !l.is_empty()))
    }
}
