//! Provision watcher collection with pre-compiled identifier patterns.

use std::collections::HashMap;

use regex::Regex;
use tokio::sync::RwLock;

use edgelink_core::models::ProvisionWatcher;
use edgelink_core::{SvcError, SvcResult};

/// A watcher plus its compiled identifier regexes.
#[derive(Debug, Clone)]
pub struct CachedWatcher {
    pub watcher: ProvisionWatcher,
    patterns: HashMap<String, Regex>,
}

impl CachedWatcher {
    fn compile(watcher: ProvisionWatcher) -> SvcResult<Self> {
        let mut patterns = HashMap::new();
        for (key, pattern) in &watcher.identifiers {
            let regex = Regex::new(pattern).map_err(|e| {
                SvcError::server(format!(
                    "watcher {}: invalid pattern for {}: {}",
                    watcher.name, key, e
                ))
            })?;
            patterns.insert(key.clone(), regex);
        }
        Ok(Self { watcher, patterns })
    }

    /// A candidate matches when every identifier pattern matches the
    /// candidate's value of the same key.
    pub fn matches(&self, identifiers: &HashMap<String, String>) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        self.patterns.iter().all(|(key, regex)| {
            identifiers
                .get(key)
                .map(|value| regex.is_match(value))
                .unwrap_or(false)
        })
    }
}

/// In-memory mirror of the provision watchers registered to this service.
#[derive(Default)]
pub struct WatcherStore {
    inner: RwLock<HashMap<String, CachedWatcher>>,
}

impl WatcherStore {
    pub async fn all(&self) -> Vec<CachedWatcher> {
        let inner = self.inner.read().await;
        inner.values().cloned().collect()
    }

    pub async fn for_name(&self, name: &str) -> Option<CachedWatcher> {
        let inner = self.inner.read().await;
        inner.get(name).cloned()
    }

    pub async fn add(&self, watcher: ProvisionWatcher) -> SvcResult<()> {
        let cached = CachedWatcher::compile(watcher)?;
        let mut inner = self.inner.write().await;
        if inner.contains_key(&cached.watcher.name) {
            return Err(SvcError::server(format!(
                "watcher {} already in cache",
                cached.watcher.name
            )));
        }
        inner.insert(cached.watcher.name.clone(), cached);
        Ok(())
    }

    pub async fn update(&self, watcher: ProvisionWatcher) -> SvcResult<()> {
        let cached = CachedWatcher::compile(watcher)?;
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&cached.watcher.name) {
            return Err(SvcError::not_found(format!(
                "watcher {} not in cache",
                cached.watcher.name
            )));
        }
        inner.insert(cached.watcher.name.clone(), cached);
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> SvcResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SvcError::not_found(format!("watcher {} not in cache", name)))
    }
}
