//! Provisioning pipeline.
//!
//! Two producers feed it: driver discovery (candidates matched against
//! provision watchers) and the configuration's `[[DeviceList]]` (devices
//! pre-declared by the operator). Both end with a device created in Core
//! Metadata; discovery then waits for the callback flow to install it,
//! while bootstrap installs config devices directly because the callback
//! surface is not up yet.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use edgelink_clients::CoreClients;
use edgelink_core::config::DeviceEntry;
use edgelink_core::models::{Device, DeviceProfile, ValueDescriptor};
use edgelink_core::{SvcError, SvcResult};

use crate::cache::Cache;
use crate::driver::DiscoveredCandidate;

/// Match candidates against the cached provision watchers and create a
/// device in Core for each first match. Returns how many devices were
/// created; the callback flow installs them into the cache.
pub async fn assign(
    cache: &Arc<Cache>,
    clients: &CoreClients,
    candidates: Vec<DiscoveredCandidate>,
    correlation: &str,
) -> SvcResult<usize> {
    let watchers = cache.watchers.all().await;
    let mut created = 0;

    for candidate in candidates {
        let Some(watcher) = watchers.iter().find(|w| w.matches(&candidate.identifiers)) else {
            debug!(identifiers = ?candidate.identifiers, "no watcher matches candidate");
            continue;
        };
        let name = synthesize_name(&watcher.watcher.name, &candidate.identifiers);
        if cache.devices.for_name(&name).await.is_some() {
            debug!(device = %name, "discovered device already registered");
            continue;
        }

        let device = Device {
            id: String::new(),
            name: name.clone(),
            profile_name: watcher.watcher.profile_name.clone(),
            description: format!("discovered via watcher {}", watcher.watcher.name),
            protocols: candidate.protocols,
            operating_state: Default::default(),
            admin_state: Default::default(),
            auto_events: vec![],
        };
        clients.device.add(&device, correlation).await.map_err(|e| {
            SvcError::server(format!("creating device {} failed: {}", name, e))
        })?;
        info!(device = %name, watcher = %watcher.watcher.name, "discovered device created in core");
        created += 1;
    }
    Ok(created)
}

/// Device name for a discovery match: `<Model>_SN:<SerialNum>` when both
/// identifiers exist, a watcher-prefixed join otherwise.
pub fn synthesize_name(watcher_name: &str, identifiers: &HashMap<String, String>) -> String {
    if let (Some(model), Some(serial)) = (identifiers.get("Model"), identifiers.get("SerialNum")) {
        return format!("{}_SN:{}", model, serial);
    }
    let mut values: Vec<&str> = identifiers.values().map(String::as_str).collect();
    values.sort_unstable();
    format!("{}-{}", watcher_name, values.join("-"))
}

/// Provision one `[[DeviceList]]` entry at bootstrap: create the device in
/// Core when unknown there, then install it into the cache directly.
pub async fn create_configured_device(
    cache: &Arc<Cache>,
    clients: &CoreClients,
    entry: &DeviceEntry,
    service_name: &str,
    correlation: &str,
) -> SvcResult<()> {
    if cache.devices.for_name(&entry.name).await.is_some() {
        debug!(device = %entry.name, "configured device already cached");
        return Ok(());
    }

    if !cache.profiles.contains(&entry.profile).await {
        let profile = clients
            .profile
            .profile_for_name(&entry.profile, correlation)
            .await
            .map_err(|e| {
                SvcError::server(format!(
                    "profile {} for configured device {} unavailable: {}",
                    entry.profile, entry.name, e
                ))
            })?;
        cache.profiles.add(profile.clone()).await?;
        push_value_descriptors(clients, &profile);
    }

    let mut device = Device {
        id: String::new(),
        name: entry.name.clone(),
        profile_name: entry.profile.clone(),
        description: entry.description.clone(),
        protocols: entry.protocols.clone(),
        operating_state: Default::default(),
        admin_state: Default::default(),
        auto_events: entry.auto_events.clone(),
    };
    let id = clients
        .device
        .add(&device, correlation)
        .await
        .map_err(|e| {
            SvcError::server(format!("creating device {} failed: {}", entry.name, e))
        })?;
    device.id = id.trim().to_string();
    cache.devices.add(device).await?;
    info!(device = %entry.name, service = service_name, "configured device provisioned");
    Ok(())
}

/// Push one value descriptor per profile resource to Core Data,
/// fire-and-forget. Readings referencing them stay queryable even if some
/// pushes fail.
pub fn push_value_descriptors(clients: &CoreClients, profile: &DeviceProfile) {
    let client = clients.value_descriptor.clone();
    let descriptors: Vec<ValueDescriptor> = profile
        .device_resources
        .values()
        .map(|resource| ValueDescriptor {
            name: resource.name.clone(),
            kind: resource.value.kind,
            default_value: None,
        })
        .collect();
    let correlation = crate::correlation_id();
    tokio::spawn(async move {
        for descriptor in descriptors {
            if let Err(e) = client.add(&descriptor, &correlation).await {
                warn!(descriptor = %descriptor.name, "value descriptor push failed: {}", e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_synthesis_prefers_model_and_serial() {
        let mut identifiers = HashMap::new();
        identifiers.insert("Model".to_string(), "X".to_string());
        identifiers.insert("SerialNum".to_string(), "123".to_string());
        assert_eq!(synthesize_name("W", &identifiers), "X_SN:123");

        let mut identifiers = HashMap::new();
        identifiers.insert("Vendor".to_string(), "acme".to_string());
        assert_eq!(synthesize_name("W", &identifiers), "W-acme");
    }
}
