//! Device-facing control server handlers
//!
//! Devices fetch their configuration, log in with the configuration
//! checksum, and register themselves here. No trust decisions are made in
//! this module; everything is delegated to the session manager.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, RawQuery, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    Json,
};
use lumen_core::{ControlReply, LoginRequest, RegisterRequest};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::state::AppState;

/// Failure body of the control server
#[derive(Serialize)]
struct Failed {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Failed {
    fn bare() -> Self {
        Self {
            message: "failed",
            error: None,
        }
    }

    fn with(error: impl Into<String>) -> Self {
        Self {
            message: "failed",
            error: Some(error.into()),
        }
    }
}

/// `GET /config?<mac>`
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let Some(mac) = query.filter(|q| !q.is_empty()) else {
        debug!("Config requested without a device");
        return (
            StatusCode::BAD_REQUEST,
            Json(Failed::with("please specify a device")),
        )
            .into_response();
    };

    debug!(mac = %mac, "Config requested");
    match state.manager.config_view(&mac) {
        Some(view) => Json(view).into_response(),
        None => (StatusCode::NOT_FOUND, Json(Failed::bare())).into_response(),
    }
}

/// `POST /login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> impl IntoResponse {
    let request: LoginRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(peer = %peer, error = %e, "Malformed login request");
            return (StatusCode::BAD_REQUEST, Json(Failed::with(e.to_string()))).into_response();
        }
    };
    debug!(mac = %request.mac, peer = %peer, "Received login request");

    let outcome = state
        .manager
        .login(&request.mac, &request.checksum, peer.ip())
        .await;

    if outcome.is_success() {
        info!(mac = %request.mac, "Login accepted");
    } else {
        debug!(mac = %request.mac, code = ?outcome, "Login rejected");
    }
    Json(ControlReply::login(outcome)).into_response()
}

/// `POST /register`
pub async fn register(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let request: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed register request");
            return (StatusCode::BAD_REQUEST, Json(Failed::with(e.to_string()))).into_response();
        }
    };
    debug!(mac = %request.mac, name = %request.name, "Received register request");

    let outcome = state.manager.register(&request.name, &request.mac).await;
    Json(ControlReply::register(outcome)).into_response()
}

/// Anything not routed: 404 for GET/POST, 501 for other methods
pub async fn unrouted(method: Method) -> StatusCode {
    if method == Method::GET || method == Method::POST {
        StatusCode::NOT_FOUND
    } else {
        debug!(method = %method, "Unsupported request method");
        StatusCode::NOT_IMPLEMENTED
    }
}
