//! REST API handlers for accessory frameworks

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lumen_core::StatusPacket;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::SessionError;
use crate::session::DeviceSession;
use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn not_found(what: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(ApiError::new(format!("{what} not found")))).into_response()
}

fn session_error(e: SessionError) -> Response {
    let status = match e {
        SessionError::UnknownLight(_) => StatusCode::NOT_FOUND,
        SessionError::NoLights(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Communication(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(ApiError::new(e.to_string()))).into_response()
}

fn find_light<'a>(
    state: &'a AppState,
    mac: &str,
    light: usize,
) -> Result<&'a Arc<DeviceSession>, Response> {
    let session = state
        .manager
        .session(mac)
        .ok_or_else(|| not_found("Device"))?;
    if !session.has_light(light) {
        return Err(not_found("Light"));
    }
    Ok(session)
}

/// List all device sessions
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.statuses().await)
}

/// List all accessories
pub async fn list_accessories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.accessories().await)
}

/// Last known state of one light
pub async fn get_light(
    State(state): State<Arc<AppState>>,
    Path((mac, light)): Path<(String, usize)>,
) -> impl IntoResponse {
    let session = match find_light(&state, &mac, light) {
        Ok(session) => session,
        Err(response) => return response,
    };

    match session.light_state(light).await {
        Ok(light_state) => Json(light_state).into_response(),
        Err(e) => session_error(e),
    }
}

/// Change one light; the device is updated in the background
pub async fn set_light(
    State(state): State<Arc<AppState>>,
    Path((mac, light)): Path<(String, usize)>,
    body: Bytes,
) -> impl IntoResponse {
    let session = match find_light(&state, &mac, light) {
        Ok(session) => session,
        Err(response) => return response,
    };

    let packet = match StatusPacket::from_slice(&body) {
        Ok(packet) => packet,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string()))).into_response()
        }
    };
    if packet.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new("no fields to change")),
        )
            .into_response();
    }

    debug!(mac = %mac, light, "Light change requested");
    match session.set_light(light, packet).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => session_error(e),
    }
}
