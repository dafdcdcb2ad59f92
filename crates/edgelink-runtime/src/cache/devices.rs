//! Device collection with name and id indexes.

use std::collections::HashMap;

use tokio::sync::RwLock;

use edgelink_core::models::{Device, OperatingState};
use edgelink_core::{SvcError, SvcResult};

#[derive(Default)]
struct DeviceInner {
    by_name: HashMap<String, Device>,
    id_to_name: HashMap<String, String>,
}

/// In-memory mirror of the devices registered to this service.
#[derive(Default)]
pub struct DeviceStore {
    inner: RwLock<DeviceInner>,
}

impl DeviceStore {
    pub async fn all(&self) -> Vec<Device> {
        let inner = self.inner.read().await;
        inner.by_name.values().cloned().collect()
    }

    pub async fn for_name(&self, name: &str) -> Option<Device> {
        let inner = self.inner.read().await;
        inner.by_name.get(name).cloned()
    }

    pub async fn for_id(&self, id: &str) -> Option<Device> {
        let inner = self.inner.read().await;
        let name = inner.id_to_name.get(id)?;
        inner.by_name.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Install a new device; fails on name collision.
    pub async fn add(&self, device: Device) -> SvcResult<()> {
        let mut inner = self.inner.write().await;
        if inner.by_name.contains_key(&device.name) {
            return Err(SvcError::server(format!(
                "device {} already in cache",
                device.name
            )));
        }
        if !device.id.is_empty() {
            inner.id_to_name.insert(device.id.clone(), device.name.clone());
        }
        inner.by_name.insert(device.name.clone(), device);
        Ok(())
    }

    /// Replace the device with the same id, keeping identity stable.
    pub async fn update(&self, device: Device) -> SvcResult<()> {
        let mut inner = self.inner.write().await;
        let Some(old_name) = inner.id_to_name.get(&device.id).cloned() else {
            return Err(SvcError::not_found(format!(
                "device id {} not in cache",
                device.id
            )));
        };
        if old_name != device.name {
            // Renames keep the id but move the name index entry.
            inner.by_name.remove(&old_name);
        }
        inner.id_to_name.insert(device.id.clone(), device.name.clone());
        inner.by_name.insert(device.name.clone(), device);
        Ok(())
    }

    /// Remove by id or name; answers the removed device so callers can tear
    /// down its schedules.
    pub async fn remove(&self, key: &str) -> SvcResult<Device> {
        let mut inner = self.inner.write().await;
        let name = inner
            .id_to_name
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string());
        let Some(device) = inner.by_name.remove(&name) else {
            return Err(SvcError::not_found(format!("device {} not in cache", key)));
        };
        inner.id_to_name.remove(&device.id);
        Ok(device)
    }

    /// Operating-state writer used by the dispatcher.
    pub async fn set_operating_state(&self, name: &str, state: OperatingState) -> SvcResult<()> {
        let mut inner = self.inner.write().await;
        let device = inner
            .by_name
            .get_mut(name)
            .ok_or_else(|| SvcError::not_found(format!("device {} not in cache", name)))?;
        device.operating_state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            profile_name: "P".into(),
            description: String::new(),
            protocols: Default::default(),
            operating_state: OperatingState::Enabled,
            admin_state: Default::default(),
            auto_events: vec![],
        }
    }

    #[tokio::test]
    async fn add_and_lookup_by_both_keys() {
        let store = DeviceStore::default();
        store.add(device("id-1", "D1")).await.unwrap();

        assert_eq!(store.for_name("D1").await.unwrap().id, "id-1");
        assert_eq!(store.for_id("id-1").await.unwrap().name, "D1");
        assert!(store.for_id("id-2").await.is_none());
    }

    #[tokio::test]
    async fn add_rejects_name_collision() {
        let store = DeviceStore::default();
        store.add(device("id-1", "D1")).await.unwrap();
        let err = store.add(device("id-2", "D1")).await.unwrap_err();
        assert!(matches!(err, SvcError::ServerError(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_preserves_identity_across_rename() {
        let store = DeviceStore::default();
        store.add(device("id-1", "D1")).await.unwrap();

        store.update(device("id-1", "D1-renamed")).await.unwrap();
        assert!(store.for_name("D1").await.is_none());
        assert_eq!(store.for_id("id-1").await.unwrap().name, "D1-renamed");

        let err = store.update(device("id-9", "ghost")).await.unwrap_err();
        assert!(matches!(err, SvcError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_by_id_or_name() {
        let store = DeviceStore::default();
        store.add(device("id-1", "D1")).await.unwrap();
        store.add(device("id-2", "D2")).await.unwrap();

        let removed = store.remove("id-1").await.unwrap();
        assert_eq!(removed.name, "D1");
        let removed = store.remove("D2").await.unwrap();
        assert_eq!(removed.id, "id-2");

        assert!(matches!(
            store.remove("id-1").await,
            Err(SvcError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn operating_state_writer() {
        let store = DeviceStore::default();
        store.add(device("id-1", "D1")).await.unwrap();
        store
            .set_operating_state("D1", OperatingState::Disabled)
            .await
            .unwrap();
        assert_eq!(
            store.for_name("D1").await.unwrap().operating_state,
            OperatingState::Disabled
        );
    }
}
