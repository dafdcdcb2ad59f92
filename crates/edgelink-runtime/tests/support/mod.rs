//! Shared test fixtures: an in-process mock Core and catalog builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tokio::sync::RwLock;

use edgelink_core::config::ClientConfig;
use edgelink_core::models::{
    AdminState, AutoEvent, Device, DeviceProfile, DeviceResource, DeviceServiceRecord, Event,
    OperatingState, ProvisionWatcher, ResourceKind, ResourceOperation, ValueSpec,
};

/// Mutable state behind the mock Core endpoints.
#[derive(Default)]
pub struct MockCore {
    pub devices_by_id: RwLock<HashMap<String, Device>>,
    pub profiles_by_id: RwLock<HashMap<String, DeviceProfile>>,
    pub profiles_by_name: RwLock<HashMap<String, DeviceProfile>>,
    pub watchers: RwLock<Vec<ProvisionWatcher>>,
    pub service_record: RwLock<Option<DeviceServiceRecord>>,
    /// Devices POSTed to `/device`.
    pub created_devices: RwLock<Vec<Device>>,
    /// Events POSTed to `/event`.
    pub events: RwLock<Vec<Event>>,
    /// `(name, state)` pairs from opstate updates.
    pub opstate_calls: RwLock<Vec<(String, String)>>,
    pub profile_name_fetches: AtomicUsize,
    pub addressable_posts: AtomicUsize,
}

impl MockCore {
    pub async fn seed_device(&self, device: Device) {
        self.devices_by_id
            .write()
            .await
            .insert(device.id.clone(), device);
    }

    pub async fn seed_profile(&self, id: &str, profile: DeviceProfile) {
        self.profiles_by_id
            .write()
            .await
            .insert(id.to_string(), profile.clone());
        self.profiles_by_name
            .write()
            .await
            .insert(profile.name.clone(), profile);
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

type Core = Arc<MockCore>;

/// Serve the mock Core on an ephemeral port; answers both the Metadata
/// and the Core Data route sets.
pub async fn spawn_core(core: Core) -> SocketAddr {
    let app = Router::new()
        .route("/api/v1/ping", get(|| async { "pong" }))
        .route("/api/v1/device", post(create_device))
        .route("/api/v1/device/servicename/{name}", get(devices_for_service))
        .route("/api/v1/device/opstate/name/{name}/{state}", put(opstate))
        .route("/api/v1/device/{id}", get(device_by_id))
        .route("/api/v1/deviceprofile/name/{name}", get(profile_by_name))
        .route("/api/v1/deviceprofile/{id}", get(profile_by_id))
        .route(
            "/api/v1/provisionwatcher/servicename/{name}",
            get(watchers_for_service),
        )
        .route(
            "/api/v1/deviceservice/name/{name}",
            get(device_service_by_name),
        )
        .route(
            "/api/v1/deviceservice",
            post(create_device_service).put(update_device_service),
        )
        .route("/api/v1/addressable", post(create_addressable))
        .route("/api/v1/event", post(create_event))
        .route("/api/v1/valuedescriptor", post(|| async { "vd-id" }))
        .with_state(core);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout: 2000,
    }
}

async fn device_by_id(
    State(core): State<Core>,
    Path(id): Path<String>,
) -> Result<Json<Device>, StatusCode> {
    core.devices_by_id
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn devices_for_service(
    State(core): State<Core>,
    Path(_name): Path<String>,
) -> Json<Vec<Device>> {
    Json(core.devices_by_id.read().await.values().cloned().collect())
}

async fn create_device(State(core): State<Core>, Json(device): Json<Device>) -> String {
    let id = format!("core-{}", device.name);
    core.created_devices.write().await.push(device);
    id
}

async fn opstate(State(core): State<Core>, Path((name, state)): Path<(String, String)>) {
    core.opstate_calls.write().await.push((name, state));
}

async fn profile_by_name(
    State(core): State<Core>,
    Path(name): Path<String>,
) -> Result<Json<DeviceProfile>, StatusCode> {
    core.profile_name_fetches.fetch_add(1, Ordering::SeqCst);
    core.profiles_by_name
        .read()
        .await
        .get(&name)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn profile_by_id(
    State(core): State<Core>,
    Path(id): Path<String>,
) -> Result<Json<DeviceProfile>, StatusCode> {
    core.profiles_by_id
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn watchers_for_service(
    State(core): State<Core>,
    Path(_name): Path<String>,
) -> Json<Vec<ProvisionWatcher>> {
    Json(core.watchers.read().await.clone())
}

async fn device_service_by_name(
    State(core): State<Core>,
    Path(_name): Path<String>,
) -> Result<Json<DeviceServiceRecord>, StatusCode> {
    core.service_record
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_device_service(
    State(core): State<Core>,
    Json(record): Json<DeviceServiceRecord>,
) -> String {
    *core.service_record.write().await = Some(record);
    "svc-id".to_string()
}

async fn update_device_service(State(core): State<Core>, Json(record): Json<DeviceServiceRecord>) {
    *core.service_record.write().await = Some(record);
}

async fn create_addressable(State(core): State<Core>) -> String {
    core.addressable_posts.fetch_add(1, Ordering::SeqCst);
    "addr-id".to_string()
}

async fn create_event(State(core): State<Core>, Json(event): Json<Event>) -> String {
    core.events.write().await.push(event);
    "event-id".to_string()
}

// ---- catalog builders ----

pub fn gauge_resource(name: &str) -> DeviceResource {
    DeviceResource {
        name: name.to_string(),
        attributes: Default::default(),
        value: ValueSpec {
            kind: ResourceKind::Integer,
            precision: None,
            writable: true,
        },
    }
}

pub fn gauge_profile(name: &str, resources: &[&str]) -> DeviceProfile {
    DeviceProfile {
        name: name.to_string(),
        device_resources: resources
            .iter()
            .map(|r| (r.to_string(), gauge_resource(r)))
            .collect(),
        device_commands: [(
            "AllGauges".to_string(),
            resources
                .iter()
                .enumerate()
                .map(|(i, r)| ResourceOperation::new(*r, i as u32))
                .collect(),
        )]
        .into(),
        core_commands: Default::default(),
    }
}

pub fn device_with_events(
    id: &str,
    name: &str,
    profile: &str,
    auto_events: Vec<AutoEvent>,
) -> Device {
    Device {
        id: id.to_string(),
        name: name.to_string(),
        profile_name: profile.to_string(),
        description: String::new(),
        protocols: Default::default(),
        operating_state: OperatingState::Enabled,
        admin_state: AdminState::Unlocked,
        auto_events,
    }
}
