//! Inbound HTTP surface.
//!
//! A thin axum layer: routes dispatch straight into the reconciler and
//! the dispatcher, and the error taxonomy maps to status codes in one
//! place.

mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use edgelink_core::{SvcError, API_PREFIX};

use crate::bootstrap::Runtime;

/// Build the service router.
pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route(&format!("{}/ping", API_PREFIX), get(handlers::ping))
        .route(
            &format!("{}/device/name/{{name}}/{{command}}", API_PREFIX),
            get(handlers::get_command).put(handlers::put_command),
        )
        .route(
            &format!("{}/callback", API_PREFIX),
            post(handlers::callback_post)
                .put(handlers::callback_put)
                .delete(handlers::callback_delete),
        )
        .route(&format!("{}/discovery", API_PREFIX), post(handlers::discovery))
        .with_state(runtime)
}

/// Service error carried out of a handler.
pub struct ApiError(pub SvcError);

impl From<SvcError> for ApiError {
    fn from(err: SvcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SvcError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SvcError::NotFound(_) => StatusCode::NOT_FOUND,
            SvcError::Locked(_) => StatusCode::LOCKED,
            SvcError::Conflict(_) => StatusCode::CONFLICT,
            SvcError::DriverTransient(_) | SvcError::DriverPermanent(_) => StatusCode::BAD_GATEWAY,
            SvcError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
