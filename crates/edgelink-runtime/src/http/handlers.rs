//! Route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::{error, info};

use edgelink_core::models::{CallbackAlert, Event};

use super::ApiError;
use crate::bootstrap::Runtime;
use crate::callback::CallbackMethod;
use crate::correlation_id;
use crate::dispatch::CommandMethod;

/// `GET /api/v1/ping`
pub async fn ping() -> &'static str {
    "pong"
}

/// `GET /api/v1/device/name/{name}/{command}`
pub async fn get_command(
    State(runtime): State<Arc<Runtime>>,
    Path((name, command)): Path<(String, String)>,
) -> Result<Json<Event>, ApiError> {
    let correlation = correlation_id();
    let event = runtime
        .dispatcher
        .handle_command(
            &name,
            &command,
            CommandMethod::Get,
            &HashMap::new(),
            &correlation,
        )
        .await?;
    Ok(Json(event))
}

/// `PUT /api/v1/device/name/{name}/{command}` with a body of
/// `{resourceName: stringValue, ...}`.
pub async fn put_command(
    State(runtime): State<Arc<Runtime>>,
    Path((name, command)): Path<(String, String)>,
    Json(params): Json<HashMap<String, String>>,
) -> Result<Json<Event>, ApiError> {
    let correlation = correlation_id();
    let event = runtime
        .dispatcher
        .handle_command(&name, &command, CommandMethod::Set, &params, &correlation)
        .await?;
    Ok(Json(event))
}

/// `POST /api/v1/callback`
pub async fn callback_post(
    State(runtime): State<Arc<Runtime>>,
    Json(alert): Json<CallbackAlert>,
) -> Result<(), ApiError> {
    apply_callback(runtime, alert, CallbackMethod::Post).await
}

/// `PUT /api/v1/callback`
pub async fn callback_put(
    State(runtime): State<Arc<Runtime>>,
    Json(alert): Json<CallbackAlert>,
) -> Result<(), ApiError> {
    apply_callback(runtime, alert, CallbackMethod::Put).await
}

/// `DELETE /api/v1/callback`
pub async fn callback_delete(
    State(runtime): State<Arc<Runtime>>,
    Json(alert): Json<CallbackAlert>,
) -> Result<(), ApiError> {
    apply_callback(runtime, alert, CallbackMethod::Delete).await
}

async fn apply_callback(
    runtime: Arc<Runtime>,
    alert: CallbackAlert,
    method: CallbackMethod,
) -> Result<(), ApiError> {
    let correlation = correlation_id();
    runtime
        .reconciler
        .handle(&alert, method, &correlation)
        .await?;
    Ok(())
}

/// `POST /api/v1/discovery`: kick the driver's discovery in the
/// background; results arrive via the provisioning pipeline and the
/// callback flow.
pub async fn discovery(State(runtime): State<Arc<Runtime>>) {
    info!("discovery requested");
    let driver = runtime.driver.clone();
    tokio::spawn(async move {
        if let Err(e) = driver.discover().await {
            error!("discovery failed: {}", e);
        }
    });
}
