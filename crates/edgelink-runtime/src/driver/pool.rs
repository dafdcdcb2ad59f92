//! Shared transport handles, one mutex per bus.
//!
//! Several devices can share one physical transport (a TCP endpoint, a
//! serial line). The pool hands out the same `Arc<Mutex<H>>` for the same
//! key, and holding that mutex for the duration of one protocol
//! transaction is what enforces "at most one I/O in flight per handle".

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Lazily-created transport handles keyed by endpoint.
pub struct HandlePool<H> {
    handles: Mutex<HashMap<String, Arc<Mutex<H>>>>,
}

impl<H> HandlePool<H> {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the handle for `key`, creating it on first use.
    ///
    /// Callers lock the returned mutex for exactly one transaction.
    pub async fn handle(&self, key: &str, make: impl FnOnce() -> H) -> Arc<Mutex<H>> {
        let mut handles = self.handles.lock().await;
        handles
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(make())))
            .clone()
    }

    /// Drop the handle for `key`, if present.
    pub async fn evict(&self, key: &str) {
        let mut handles = self.handles.lock().await;
        handles.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }
}

impl<H> Default for HandlePool<H> {
    fn default() -> Self {
        Self::new()
    }
}
