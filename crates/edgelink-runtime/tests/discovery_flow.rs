//! Discovery candidates through the provisioning pipeline.

mod support;

use std::collections::HashMap;
use std::sync::Arc;

use edgelink_clients::CoreClients;
use edgelink_core::models::ProvisionWatcher;
use edgelink_runtime::cache::Cache;
use edgelink_runtime::driver::DiscoveredCandidate;
use edgelink_runtime::provision;

use support::{device_with_events, gauge_profile, spawn_core, MockCore};

fn candidate(model: &str, serial: &str) -> DiscoveredCandidate {
    let mut identifiers = HashMap::new();
    identifiers.insert("Model".to_string(), model.to_string());
    identifiers.insert("SerialNum".to_string(), serial.to_string());
    let mut protocols = edgelink_core::models::ProtocolMap::new();
    protocols.insert(
        "ModbusRTU".to_string(),
        [("Address", "/dev/ttyS0"), ("UnitID", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    DiscoveredCandidate {
        identifiers,
        protocols,
    }
}

fn model_watcher(name: &str, pattern: &str) -> ProvisionWatcher {
    ProvisionWatcher {
        id: String::new(),
        name: name.to_string(),
        profile_name: "GaugeProfile".to_string(),
        identifiers: [("Model".to_string(), pattern.to_string())].into(),
    }
}

async fn discovery_fixture() -> (Arc<MockCore>, Arc<Cache>, CoreClients) {
    let core = Arc::new(MockCore::default());
    let addr = spawn_core(core.clone()).await;
    let client_config = support::client_config(addr);
    let clients = CoreClients::new(&client_config, &client_config).unwrap();
    (core, Arc::new(Cache::new()), clients)
}

#[tokio::test]
async fn matching_candidate_creates_a_device_in_core() {
    let (core, cache, clients) = discovery_fixture().await;
    cache.watchers.add(model_watcher("X-match", "^X$")).await.unwrap();

    let created = provision::assign(&cache, &clients, vec![candidate("X", "123")], "corr")
        .await
        .unwrap();
    assert_eq!(created, 1);

    let devices = core.created_devices.read().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "X_SN:123");
    assert_eq!(devices[0].profile_name, "GaugeProfile");
    assert_eq!(devices[0].protocols["ModbusRTU"]["UnitID"], "3");
}

#[tokio::test]
async fn unmatched_candidates_are_ignored() {
    let (core, cache, clients) = discovery_fixture().await;
    cache.watchers.add(model_watcher("X-match", "^X$")).await.unwrap();

    let created = provision::assign(&cache, &clients, vec![candidate("Y", "1")], "corr")
        .await
        .unwrap();
    assert_eq!(created, 0);
    assert!(core.created_devices.read().await.is_empty());
}

#[tokio::test]
async fn already_registered_devices_are_skipped() {
    let (core, cache, clients) = discovery_fixture().await;
    cache.watchers.add(model_watcher("X-match", "^X$")).await.unwrap();
    cache
        .profiles
        .add(gauge_profile("GaugeProfile", &["Gauge0"]))
        .await
        .unwrap();
    cache
        .devices
        .add(device_with_events("id-1", "X_SN:123", "GaugeProfile", vec![]))
        .await
        .unwrap();

    let created = provision::assign(&cache, &clients, vec![candidate("X", "123")], "corr")
        .await
        .unwrap();
    assert_eq!(created, 0);
    assert!(core.created_devices.read().await.is_empty());
}
