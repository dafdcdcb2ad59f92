//! Profile collection with derived dispatch indexes.
//!
//! On every add/update the profile's device commands are materialized into
//! a command-name index, and the register attributes of each resource are
//! parsed into typed wire descriptors. Both validations happen here, once,
//! so a profile that made it into the cache can be dispatched without
//! re-parsing.

use std::collections::HashMap;

use tokio::sync::RwLock;

use edgelink_core::models::{DeviceProfile, ResourceOperation};
use edgelink_core::wire::WireSpec;
use edgelink_core::{SvcError, SvcResult};

/// A profile plus its derived dispatch data.
#[derive(Debug, Clone)]
pub struct CachedProfile {
    pub profile: DeviceProfile,
    /// Command name to its ordered expansion.
    pub resource_ops: HashMap<String, Vec<ResourceOperation>>,
    /// Resource name to its typed register descriptor, when the profile
    /// declares register attributes.
    pub wire_specs: HashMap<String, WireSpec>,
}

impl CachedProfile {
    /// Validate and derive the dispatch indexes.
    fn materialize(profile: DeviceProfile) -> SvcResult<Self> {
        let mut wire_specs = HashMap::new();
        for (name, resource) in &profile.device_resources {
            if let Some(spec) = WireSpec::from_resource(resource)? {
                wire_specs.insert(name.clone(), spec);
            }
        }

        let mut resource_ops = HashMap::new();
        for (command, ops) in &profile.device_commands {
            for op in ops {
                if !profile.device_resources.contains_key(&op.resource_name) {
                    return Err(SvcError::server(format!(
                        "profile {}: command {} references unknown resource {}",
                        profile.name, command, op.resource_name
                    )));
                }
            }
            resource_ops.insert(command.clone(), ops.clone());
        }

        Ok(Self {
            profile,
            resource_ops,
            wire_specs,
        })
    }
}

/// In-memory mirror of the profiles referenced by cached devices.
#[derive(Default)]
pub struct ProfileStore {
    inner: RwLock<HashMap<String, CachedProfile>>,
}

impl ProfileStore {
    pub async fn all(&self) -> Vec<DeviceProfile> {
        let inner = self.inner.read().await;
        inner.values().map(|c| c.profile.clone()).collect()
    }

    pub async fn for_name(&self, name: &str) -> Option<CachedProfile> {
        let inner = self.inner.read().await;
        inner.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }

    pub async fn add(&self, profile: DeviceProfile) -> SvcResult<()> {
        let cached = CachedProfile::materialize(profile)?;
        let mut inner = self.inner.write().await;
        if inner.contains_key(&cached.profile.name) {
            return Err(SvcError::server(format!(
                "profile {} already in cache",
                cached.profile.name
            )));
        }
        inner.insert(cached.profile.name.clone(), cached);
        Ok(())
    }

    pub async fn update(&self, profile: DeviceProfile) -> SvcResult<()> {
        let cached = CachedProfile::materialize(profile)?;
        let mut inner = self.inner.write().await;
        if !inner.contains_key(&cached.profile.name) {
            return Err(SvcError::not_found(format!(
                "profile {} not in cache",
                cached.profile.name
            )));
        }
        inner.insert(cached.profile.name.clone(), cached);
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> SvcResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SvcError::not_found(format!("profile {} not in cache", name)))
    }
}
