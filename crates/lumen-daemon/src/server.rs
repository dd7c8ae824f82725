//! Router construction and listener startup

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api;
use crate::control;
use crate::state::AppState;

/// Device-facing routes
pub fn control_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", get(control::get_config).fallback(control::unrouted))
        .route("/login", post(control::login).fallback(control::unrouted))
        .route("/register", post(control::register).fallback(control::unrouted))
        .fallback(control::unrouted)
        .with_state(state)
}

/// Accessory-facing routes
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(api::list_devices))
        .route("/api/accessories", get(api::list_accessories))
        .route(
            "/api/devices/{mac}/lights/{light}",
            get(api::get_light).put(api::set_light),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run both servers until Ctrl-C, then log every device out
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = stop_tx.send(true);
    });

    let control = run_http(
        "control",
        control_router(state.clone()),
        &state.config.daemon.control_bind,
        stop_rx.clone(),
    );
    let api = run_http(
        "api",
        api_router(state.clone()),
        &state.config.daemon.api_bind,
        stop_rx,
    );

    let served = tokio::try_join!(control, api);
    state.manager.shutdown().await;
    served?;
    Ok(())
}

/// Run plain HTTP server until the stop flag is raised
async fn run_http(
    name: &str,
    app: Router,
    bind: &str,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(server = name, address = %bind, protocol = "HTTP", "Starting server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop.wait_for(|stopped| *stopped).await;
    })
    .await?;

    info!(server = name, "Server stopped");
    Ok(())
}
