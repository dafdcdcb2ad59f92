//! AutoEvent manager.
//!
//! Installs one cron entry per (device, auto event) and keeps that set
//! consistent with the cache: entries exist exactly while the device is
//! cached and unlocked. Each tick runs the regular dispatch pipeline for
//! the resource and forwards the reading to Core Data, optionally
//! suppressed when the value did not change.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use edgelink_core::models::Device;

use crate::cache::Cache;
use crate::correlation_id;
use crate::cron::{CronEngine, EntryId, Task};
use crate::dispatch::{CommandDispatcher, CommandMethod};

/// Per-device scheduling of periodic resource reads.
pub struct AutoEventManager {
    engine: Arc<CronEngine>,
    cache: Arc<Cache>,
    dispatcher: Arc<CommandDispatcher>,
    entries: RwLock<HashMap<String, Vec<EntryId>>>,
}

impl AutoEventManager {
    pub fn new(
        cache: Arc<Cache>,
        dispatcher: Arc<CommandDispatcher>,
        engine: Arc<CronEngine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            cache,
            dispatcher,
            entries: RwLock::new(HashMap::new()),
        })
    }

    /// Install timers for every cached device. Called once at bootstrap,
    /// after the cache seed.
    pub async fn start_all(self: &Arc<Self>) {
        self.engine.start();
        for device in self.cache.devices.all().await {
            self.install(&device).await;
        }
    }

    /// Tear down and re-install the timers for one device from current
    /// cache state. Callers must have updated the cache already.
    pub async fn restart_for_device(self: &Arc<Self>, device_name: &str) {
        self.stop_for_device(device_name).await;
        if let Some(device) = self.cache.devices.for_name(device_name).await {
            self.install(&device).await;
        }
    }

    /// Remove all timers for one device.
    pub async fn stop_for_device(&self, device_name: &str) {
        self.engine.pause();
        let ids = self
            .entries
            .write()
            .await
            .remove(device_name)
            .unwrap_or_default();
        for id in &ids {
            self.engine.cancel(*id).await;
        }
        self.engine.resume();
        if !ids.is_empty() {
            debug!(device = device_name, removed = ids.len(), "auto events stopped");
        }
    }

    /// Terminate the scheduler; running ticks complete but are not
    /// re-scheduled.
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// Wait for in-flight ticks to finish; part of graceful shutdown.
    pub async fn drain(&self) {
        self.engine.drain().await;
    }

    /// Active timer count for one device.
    pub async fn entry_count(&self, device_name: &str) -> usize {
        self.entries
            .read()
            .await
            .get(device_name)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    async fn install(self: &Arc<Self>, device: &Device) {
        if device.is_locked() {
            debug!(device = %device.name, "device is locked, no auto events installed");
            return;
        }
        self.engine.pause();
        let mut ids = Vec::new();
        for auto_event in &device.auto_events {
            match auto_event.interval() {
                Ok(every) => {
                    let task = self.tick_task(
                        device.name.clone(),
                        auto_event.resource.clone(),
                        auto_event.on_change,
                    );
                    ids.push(self.engine.schedule(every, task).await);
                }
                Err(e) => {
                    warn!(device = %device.name, resource = %auto_event.resource,
                          "skipping auto event: {}", e);
                }
            }
        }
        self.engine.resume();
        if !ids.is_empty() {
            debug!(device = %device.name, installed = ids.len(), "auto events started");
            self.entries.write().await.insert(device.name.clone(), ids);
        }
    }

    fn tick_task(&self, device_name: String, resource: String, on_change: bool) -> Task {
        let cache = self.cache.clone();
        let dispatcher = self.dispatcher.clone();
        let last_value: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        Arc::new(move || {
            let cache = cache.clone();
            let dispatcher = dispatcher.clone();
            let last_value = last_value.clone();
            let device_name = device_name.clone();
            let resource = resource.clone();
            Box::pin(async move {
                // The cache may have lost the device between the cron fire
                // and now; the tick is simply dropped.
                if cache.devices.for_name(&device_name).await.is_none() {
                    return;
                }
                let correlation = correlation_id();
                let result = dispatcher
                    .execute(
                        &device_name,
                        &resource,
                        CommandMethod::Get,
                        &HashMap::new(),
                        &correlation,
                    )
                    .await;
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        // Next tick tries again; the schedule survives.
                        warn!(device = %device_name, resource = %resource,
                              "auto event read failed: {}", e);
                        return;
                    }
                };
                let value = event
                    .readings
                    .first()
                    .map(|r| r.value.clone())
                    .unwrap_or_default();
                if on_change {
                    let mut last = last_value.lock().await;
                    if last.as_deref() == Some(value.as_str()) {
                        return;
                    }
                    *last = Some(value);
                }
                dispatcher.post_event(event, &correlation);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{CommandRequest, DriverResult, DriverSinks, ProtocolDriver};
    use async_trait::async_trait;
    use edgelink_core::config::ClientConfig;
    use edgelink_core::models::{AdminState, AutoEvent, OperatingState, ProtocolMap};
    use edgelink_core::value::CommandValue;
    use edgelink_clients::CoreClients;
    use std::time::Duration;

    /// Driver answering a constant integer for every read.
    struct StaticDriver;

    #[async_trait]
    impl ProtocolDriver for StaticDriver {
        async fn initialize(&self, _sinks: DriverSinks) -> DriverResult<()> {
            Ok(())
        }

        async fn handle_read_commands(
            &self,
            _device_name: &str,
            _protocols: &ProtocolMap,
            requests: &[CommandRequest],
        ) -> DriverResult<Vec<CommandValue>> {
            Ok(requests
                .iter()
                .map(|r| CommandValue::new_i64(r.operation.resource_name.clone(), 1, 21))
                .collect())
        }

        async fn handle_write_commands(
            &self,
            _device_name: &str,
            _protocols: &ProtocolMap,
            _requests: &[CommandRequest],
            _values: &[CommandValue],
        ) -> DriverResult<()> {
            Ok(())
        }

        async fn disconnect_device(
            &self,
            _device_name: &str,
            _protocols: &ProtocolMap,
        ) -> DriverResult<()> {
            Ok(())
        }

        async fn discover(&self) -> DriverResult<()> {
            Ok(())
        }

        async fn stop(&self, _force: bool) -> DriverResult<()> {
            Ok(())
        }
    }

    fn offline_clients() -> CoreClients {
        let unreachable = ClientConfig {
            host: "127.0.0.1".into(),
            port: 1,
            timeout: 50,
        };
        CoreClients::new(&unreachable, &unreachable).unwrap()
    }

    fn polled_device(name: &str, admin: AdminState, events: usize) -> Device {
        Device {
            id: format!("id-{}", name),
            name: name.into(),
            profile_name: "GaugeProfile".into(),
            description: String::new(),
            protocols: Default::default(),
            operating_state: OperatingState::Enabled,
            admin_state: admin,
            auto_events: (0..events)
                .map(|i| AutoEvent {
                    resource: format!("Gauge{}", i),
                    frequency: "1s".into(),
                    on_change: false,
                })
                .collect(),
        }
    }

    fn gauge_profile(resources: usize) -> edgelink_core::models::DeviceProfile {
        use edgelink_core::models::{DeviceProfile, DeviceResource, ResourceKind, ValueSpec};
        DeviceProfile {
            name: "GaugeProfile".into(),
            device_resources: (0..resources)
                .map(|i| {
                    let name = format!("Gauge{}", i);
                    (
                        name.clone(),
                        DeviceResource {
                            name,
                            attributes: Default::default(),
                            value: ValueSpec {
                                kind: ResourceKind::Integer,
                                precision: None,
                                writable: false,
                            },
                        },
                    )
                })
                .collect(),
            device_commands: Default::default(),
            core_commands: Default::default(),
        }
    }

    async fn manager_fixture() -> (Arc<Cache>, Arc<AutoEventManager>) {
        let cache = Arc::new(Cache::new());
        cache.profiles.add(gauge_profile(3)).await.unwrap();
        let dispatcher = Arc::new(CommandDispatcher::new(
            cache.clone(),
            Arc::new(StaticDriver),
            offline_clients(),
        ));
        let engine = CronEngine::new(4, Duration::from_millis(10));
        let manager = AutoEventManager::new(cache.clone(), dispatcher, engine);
        (cache, manager)
    }

    #[tokio::test]
    async fn entry_count_matches_auto_events_when_unlocked() {
        let (cache, manager) = manager_fixture().await;
        cache
            .devices
            .add(polled_device("D1", AdminState::Unlocked, 2))
            .await
            .unwrap();
        cache
            .devices
            .add(polled_device("D2", AdminState::Locked, 3))
            .await
            .unwrap();

        manager.start_all().await;
        assert_eq!(manager.entry_count("D1").await, 2);
        assert_eq!(manager.entry_count("D2").await, 0);
        manager.stop();
    }

    #[tokio::test]
    async fn restart_follows_cache_state() {
        let (cache, manager) = manager_fixture().await;
        cache
            .devices
            .add(polled_device("D1", AdminState::Unlocked, 1))
            .await
            .unwrap();
        manager.start_all().await;
        assert_eq!(manager.entry_count("D1").await, 1);

        // The catalog grows an auto event; a callback updates the cache
        // and asks for a restart.
        let updated = polled_device("D1", AdminState::Unlocked, 3);
        cache.devices.update(updated).await.unwrap();
        manager.restart_for_device("D1").await;
        assert_eq!(manager.entry_count("D1").await, 3);

        // Locking the device drops every entry on the next restart.
        let locked = polled_device("D1", AdminState::Locked, 3);
        cache.devices.update(locked).await.unwrap();
        manager.restart_for_device("D1").await;
        assert_eq!(manager.entry_count("D1").await, 0);

        manager.stop();
    }

    #[tokio::test]
    async fn stop_for_device_removes_all_entries() {
        let (cache, manager) = manager_fixture().await;
        cache
            .devices
            .add(polled_device("D1", AdminState::Unlocked, 2))
            .await
            .unwrap();
        manager.start_all().await;

        manager.stop_for_device("D1").await;
        assert_eq!(manager.entry_count("D1").await, 0);
        manager.stop();
    }

    #[tokio::test]
    async fn restart_for_unknown_device_installs_nothing() {
        let (_cache, manager) = manager_fixture().await;
        manager.start_all().await;
        manager.restart_for_device("ghost").await;
        assert_eq!(manager.entry_count("ghost").await, 0);
        manager.stop();
    }

    #[tokio::test]
    async fn invalid_frequency_skips_only_that_entry() {
        let (cache, manager) = manager_fixture().await;
        let mut device = polled_device("D1", AdminState::Unlocked, 2);
        device.auto_events[1].frequency = "never".into();
        cache.devices.add(device).await.unwrap();

        manager.start_all().await;
        assert_eq!(manager.entry_count("D1").await, 1);
        manager.stop();
    }
}
