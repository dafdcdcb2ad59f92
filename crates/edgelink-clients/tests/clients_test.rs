//! Typed client behavior against an in-process endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tokio::sync::RwLock;

use edgelink_clients::{ping, CoreClients, Transport, CORRELATION_HEADER};
use edgelink_core::config::ClientConfig;
use edgelink_core::models::{Device, Event, OperatingState, Reading};

#[derive(Default)]
struct Endpoint {
    correlations: RwLock<Vec<String>>,
    opstate_calls: RwLock<Vec<String>>,
    events: RwLock<Vec<Event>>,
}

async fn spawn_endpoint(state: Arc<Endpoint>) -> SocketAddr {
    async fn device(
        State(state): State<Arc<Endpoint>>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<Device>, StatusCode> {
        if let Some(value) = headers.get(CORRELATION_HEADER) {
            state
                .correlations
                .write()
                .await
                .push(value.to_str().unwrap_or_default().to_string());
        }
        if id != "abc" {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(Json(Device {
            id: "abc".into(),
            name: "Meter-7".into(),
            profile_name: "CVM-C10".into(),
            description: String::new(),
            protocols: Default::default(),
            operating_state: Default::default(),
            admin_state: Default::default(),
            auto_events: vec![],
        }))
    }

    async fn opstate(
        State(state): State<Arc<Endpoint>>,
        Path((name, op)): Path<(String, String)>,
    ) {
        state.opstate_calls.write().await.push(format!("{}:{}", name, op));
    }

    async fn event(State(state): State<Arc<Endpoint>>, Json(event): Json<Event>) -> String {
        state.events.write().await.push(event);
        "event-1".to_string()
    }

    let app = Router::new()
        .route("/api/v1/ping", get(|| async { "pong" }))
        .route("/api/v1/device/{id}", get(device))
        .route("/api/v1/device/opstate/name/{name}/{state}", put(opstate))
        .route("/api/v1/event", post(event))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn clients_for(addr: SocketAddr) -> CoreClients {
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout: 1000,
    };
    CoreClients::new(&config, &config).unwrap()
}

#[tokio::test]
async fn ping_succeeds_and_fails_cleanly() {
    let addr = spawn_endpoint(Arc::new(Endpoint::default())).await;
    ping(&format!("http://{}", addr), Duration::from_millis(500))
        .await
        .unwrap();

    let err = ping("http://127.0.0.1:1", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        edgelink_clients::ClientError::Unreachable(_)
    ));
}

#[tokio::test]
async fn device_fetch_decodes_and_propagates_correlation() {
    let state = Arc::new(Endpoint::default());
    let addr = spawn_endpoint(state.clone()).await;
    let clients = clients_for(addr);

    let device = clients.device.device("abc", "corr-1").await.unwrap();
    assert_eq!(device.name, "Meter-7");
    assert_eq!(device.profile_name, "CVM-C10");

    let correlations = state.correlations.read().await;
    assert_eq!(*correlations, vec!["corr-1".to_string()]);
}

#[tokio::test]
async fn missing_records_read_as_not_found() {
    let addr = spawn_endpoint(Arc::new(Endpoint::default())).await;
    let clients = clients_for(addr);

    let err = clients.device.device("ghost", "corr").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn opstate_update_hits_the_path_encoded_route() {
    let state = Arc::new(Endpoint::default());
    let addr = spawn_endpoint(state.clone()).await;
    let clients = clients_for(addr);

    clients
        .device
        .update_op_state_by_name("Meter-7", OperatingState::Disabled, "corr")
        .await
        .unwrap();
    let calls = state.opstate_calls.read().await;
    assert_eq!(*calls, vec!["Meter-7:DISABLED".to_string()]);
}

#[tokio::test]
async fn events_round_trip_through_core_data() {
    let state = Arc::new(Endpoint::default());
    let addr = spawn_endpoint(state.clone()).await;
    let clients = clients_for(addr);

    let event = Event {
        device: "Meter-7".into(),
        origin: 1700000000000,
        readings: vec![Reading {
            name: "CurrentL1".into(),
            value: "300".into(),
            origin: 1700000000000,
        }],
    };
    let id = clients.event.add(&event, "corr").await.unwrap();
    assert_eq!(id, "event-1");
    assert_eq!(state.events.read().await[0], event);
}

#[tokio::test]
async fn transport_reports_status_and_decode_failures() {
    let addr = spawn_endpoint(Arc::new(Endpoint::default())).await;
    let transport = Transport::new(
        &format!("http://{}", addr),
        Duration::from_millis(500),
    )
    .unwrap();

    // Plain-text body where JSON is expected.
    let err = transport
        .get_json::<Device>("/api/v1/ping", "corr")
        .await
        .unwrap_err();
    assert!(matches!(err, edgelink_clients::ClientError::Decode(_)));
}
