//! Dependency-bootstrap sequencer.
//!
//! Phases run strictly in order and any failure is fatal; the binary maps
//! a [`BootstrapError`] to a non-zero exit. The result is a [`Runtime`]
//! context holding every component; it is passed explicitly wherever
//! needed, keeping the process free of global mutable state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use edgelink_clients::{ping, CoreClients};
use edgelink_core::config::{ClientConfig, Config, CLIENT_DATA, CLIENT_METADATA};
use edgelink_core::models::{
    AdminState, Addressable, DeviceServiceRecord, Event, Reading,
};
use edgelink_core::API_PREFIX;

use crate::autoevent::AutoEventManager;
use crate::cache::Cache;
use crate::callback::CallbackReconciler;
use crate::correlation_id;
use crate::cron::CronEngine;
use crate::dispatch::CommandDispatcher;
use crate::driver::{AsyncReadings, DiscoveredCandidate, DriverSinks, ProtocolDriver};
use crate::provision;

/// Cron scan interval for auto events.
const CRON_TICK: Duration = Duration::from_millis(100);
/// Concurrent auto event ticks.
const CRON_WORKERS: usize = 8;
/// Buffered unsolicited readings before drivers are back-pressured.
const ASYNC_SINK_DEPTH: usize = 64;

/// Fatal startup failure; the process exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("service dependency {0} checking time out")]
    Dependency(String),

    #[error("service registration failed: {0}")]
    Registration(String),

    #[error("cache seed failed: {0}")]
    Seed(String),

    #[error("driver initialization failed: {0}")]
    Driver(String),
}

/// Everything a running service is made of.
pub struct Runtime {
    pub config: Arc<Config>,
    pub clients: CoreClients,
    pub cache: Arc<Cache>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub autoevents: Arc<AutoEventManager>,
    pub reconciler: Arc<CallbackReconciler>,
    pub driver: Arc<dyn ProtocolDriver>,
}

impl Runtime {
    /// Graceful (`force = false`) or immediate shutdown. Graceful drains
    /// in-flight auto event ticks before stopping the driver.
    pub async fn shutdown(&self, force: bool) {
        self.autoevents.stop();
        if !force {
            self.autoevents.drain().await;
        }
        if let Err(e) = self.driver.stop(force).await {
            warn!("driver stop reported: {}", e);
        }
        info!("runtime stopped");
    }
}

/// Run the bootstrap phases and assemble the runtime.
pub async fn bootstrap(
    config: Config,
    driver: Arc<dyn ProtocolDriver>,
) -> Result<Runtime, BootstrapError> {
    // Phase: configuration sanity.
    config
        .validate()
        .map_err(|e| BootstrapError::Config(e.to_string()))?;
    let config = Arc::new(config);

    // Phase: dependency ping, both Core services in parallel.
    check_dependencies(&config).await?;

    // Phase: typed clients.
    let clients = CoreClients::new(config.metadata_client(), config.data_client())
        .map_err(|e| BootstrapError::Config(e.to_string()))?;

    // Phase: service registration.
    let correlation = correlation_id();
    register_service(&config, &clients, &correlation).await?;

    // Phase: cache seed plus configured device provisioning.
    let cache = Arc::new(Cache::new());
    seed_cache(&config, &clients, &cache, &correlation).await?;
    for entry in &config.device_list {
        provision::create_configured_device(
            &cache,
            &clients,
            entry,
            &config.service.name,
            &correlation,
        )
        .await
        .map_err(|e| BootstrapError::Seed(e.to_string()))?;
    }

    // Phase: driver initialization, plus the background consumers for
    // both driver sinks.
    let (async_tx, async_rx) = mpsc::channel(ASYNC_SINK_DEPTH);
    let (discovered_tx, discovered_rx) = mpsc::channel(ASYNC_SINK_DEPTH);
    driver
        .initialize(DriverSinks {
            readings: async_tx,
            discovered: discovered_tx,
        })
        .await
        .map_err(|e| BootstrapError::Driver(e.to_string()))?;
    spawn_async_forwarder(clients.clone(), async_rx);
    spawn_provision_worker(cache.clone(), clients.clone(), discovered_rx);

    // Phase: scheduler over the seeded auto events.
    let dispatcher = Arc::new(CommandDispatcher::new(
        cache.clone(),
        driver.clone(),
        clients.clone(),
    ));
    let engine = CronEngine::new(CRON_WORKERS, CRON_TICK);
    let autoevents = AutoEventManager::new(cache.clone(), dispatcher.clone(), engine);
    autoevents.start_all().await;

    let reconciler = CallbackReconciler::new(
        cache.clone(),
        clients.clone(),
        autoevents.clone(),
        dispatcher.clone(),
        driver.clone(),
    );

    info!(
        service = %config.service.name,
        devices = cache.devices.len().await,
        "bootstrap complete"
    );

    Ok(Runtime {
        config,
        clients,
        cache,
        dispatcher,
        autoevents,
        reconciler,
        driver,
    })
}

/// Ping both Core services until they answer or the retry budget runs out.
async fn check_dependencies(config: &Config) -> Result<(), BootstrapError> {
    let (metadata, data) = tokio::join!(
        wait_for_service(CLIENT_METADATA, config.metadata_client(), config),
        wait_for_service(CLIENT_DATA, config.data_client(), config),
    );
    metadata.and(data)
}

async fn wait_for_service(
    name: &str,
    client: &ClientConfig,
    config: &Config,
) -> Result<(), BootstrapError> {
    let timeout = Duration::from_millis(client.timeout);
    let delay = Duration::from_millis(config.service.timeout);
    for attempt in 1..=config.service.connect_retries {
        match ping(&client.url(), timeout).await {
            Ok(()) => {
                info!(service = name, "dependency is available");
                return Ok(());
            }
            Err(e) => {
                info!(service = name, attempt, "dependency not ready yet: {}", e);
            }
        }
        tokio::time::sleep(delay).await;
    }
    let err = BootstrapError::Dependency(name.to_string());
    error!("{}", err);
    Err(err)
}

/// Ensure Core Metadata knows this service and points its callback
/// addressable at us.
async fn register_service(
    config: &Config,
    clients: &CoreClients,
    correlation: &str,
) -> Result<(), BootstrapError> {
    let service_name = &config.service.name;
    let addressable = Addressable {
        id: String::new(),
        name: service_name.clone(),
        protocol: "HTTP".into(),
        address: config.service.host.clone(),
        port: config.service.port,
        path: format!("{}/callback", API_PREFIX),
    };

    match clients
        .device_service
        .device_service_for_name(service_name, correlation)
        .await
    {
        Ok(record) => {
            if addressable_matches(&record.addressable, &addressable) {
                info!(service = %service_name, "service registration is current");
                return Ok(());
            }
            // The stored callback target drifted (host change, redeploy);
            // bring it back to us.
            let updated = DeviceServiceRecord {
                id: record.id,
                name: service_name.clone(),
                addressable,
                admin_state: record.admin_state,
            };
            clients
                .addressable
                .add(&updated.addressable, correlation)
                .await
                .map_err(|e| BootstrapError::Registration(e.to_string()))?;
            clients
                .device_service
                .update(&updated, correlation)
                .await
                .map_err(|e| BootstrapError::Registration(e.to_string()))?;
            info!(service = %service_name, "service addressable reconciled");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            clients
                .addressable
                .add(&addressable, correlation)
                .await
                .map_err(|e| BootstrapError::Registration(e.to_string()))?;
            let record = DeviceServiceRecord {
                id: String::new(),
                name: service_name.clone(),
                addressable,
                admin_state: AdminState::Unlocked,
            };
            clients
                .device_service
                .add(&record, correlation)
                .await
                .map_err(|e| BootstrapError::Registration(e.to_string()))?;
            info!(service = %service_name, "service registered with core metadata");
            Ok(())
        }
        Err(e) => Err(BootstrapError::Registration(e.to_string())),
    }
}

fn addressable_matches(stored: &Addressable, ours: &Addressable) -> bool {
    stored.protocol == ours.protocol
        && stored.address == ours.address
        && stored.port == ours.port
        && stored.path == ours.path
}

/// Fetch this service's devices and watchers, then the union of profiles
/// both reference, and install everything into the cache.
async fn seed_cache(
    config: &Config,
    clients: &CoreClients,
    cache: &Arc<Cache>,
    correlation: &str,
) -> Result<(), BootstrapError> {
    let service_name = &config.service.name;
    let devices = clients
        .device
        .devices_for_service(service_name, correlation)
        .await
        .map_err(|e| BootstrapError::Seed(format!("device fetch: {}", e)))?;
    let watchers = clients
        .watcher
        .watchers_for_service(service_name, correlation)
        .await
        .map_err(|e| BootstrapError::Seed(format!("watcher fetch: {}", e)))?;

    let mut profile_names: BTreeSet<String> = BTreeSet::new();
    profile_names.extend(devices.iter().map(|d| d.profile_name.clone()));
    profile_names.extend(watchers.iter().map(|w| w.profile_name.clone()));

    for name in profile_names {
        let profile = clients
            .profile
            .profile_for_name(&name, correlation)
            .await
            .map_err(|e| BootstrapError::Seed(format!("profile {} fetch: {}", name, e)))?;
        cache
            .profiles
            .add(profile.clone())
            .await
            .map_err(|e| BootstrapError::Seed(e.to_string()))?;
        provision::push_value_descriptors(clients, &profile);
    }
    for device in devices {
        cache
            .devices
            .add(device)
            .await
            .map_err(|e| BootstrapError::Seed(e.to_string()))?;
    }
    for watcher in watchers {
        cache
            .watchers
            .add(watcher)
            .await
            .map_err(|e| BootstrapError::Seed(e.to_string()))?;
    }

    info!(
        devices = cache.devices.len().await,
        "cache seeded from core metadata"
    );
    Ok(())
}

/// Feed discovery candidates into the provisioning pipeline.
fn spawn_provision_worker(
    cache: Arc<Cache>,
    clients: CoreClients,
    mut rx: mpsc::Receiver<Vec<DiscoveredCandidate>>,
) {
    tokio::spawn(async move {
        while let Some(candidates) = rx.recv().await {
            let correlation = correlation_id();
            match provision::assign(&cache, &clients, candidates, &correlation).await {
                Ok(created) if created > 0 => {
                    info!(created, "discovery candidates provisioned");
                }
                Ok(_) => {}
                Err(e) => warn!("discovery provisioning failed: {}", e),
            }
        }
    });
}

/// Forward unsolicited driver readings to Core Data.
fn spawn_async_forwarder(clients: CoreClients, mut rx: mpsc::Receiver<AsyncReadings>) {
    tokio::spawn(async move {
        while let Some(readings) = rx.recv().await {
            let readings_list: Vec<Reading> = readings
                .values
                .iter()
                .map(|value| Reading {
                    name: value.resource.clone(),
                    value: value.value_string(),
                    origin: value.origin,
                })
                .collect();
            if readings_list.is_empty() {
                continue;
            }
            let event = Event {
                device: readings.device_name.clone(),
                origin: chrono::Utc::now().timestamp_millis(),
                readings: readings_list,
            };
            let correlation = correlation_id();
            if let Err(e) = clients.event.add(&event, &correlation).await {
                warn!(device = %readings.device_name, "async reading push failed: {}", e);
            }
        }
    });
}
