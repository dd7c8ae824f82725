//! In-process fake device serving `GET`/`PUT /state` for tests

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use lumen_core::{Accessory, DeviceConfig};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sync::StateSynchronizer;

#[derive(Default)]
struct FakeState {
    body: Mutex<Value>,
    last_put: Mutex<Option<Value>>,
    gets: AtomicUsize,
    puts: AtomicUsize,
    failing: AtomicBool,
}

pub struct FakeDevice {
    addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeDevice {
    /// Start a fake device answering pulls with `body`
    pub async fn start(body: Value) -> Self {
        let state = Arc::new(FakeState {
            body: Mutex::new(body),
            ..Default::default()
        });

        let app = Router::new()
            .route("/state", get(read_state).put(write_state))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn synchronizer(&self) -> StateSynchronizer {
        StateSynchronizer::new(self.port(), Duration::from_millis(500)).unwrap()
    }

    pub fn set_body(&self, body: Value) {
        *self.state.body.lock().unwrap() = body;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.state.puts.load(Ordering::SeqCst)
    }

    pub fn last_put(&self) -> Option<Value> {
        self.state.last_put.lock().unwrap().clone()
    }

    /// Wait until at least `count` pushes arrived
    pub async fn wait_for_puts(&self, count: usize) {
        for _ in 0..100 {
            if self.puts() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} pushes, saw {}", self.puts());
    }
}

async fn read_state(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.gets.fetch_add(1, Ordering::SeqCst);
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let body = state.body.lock().unwrap().clone();
    Json(body).into_response()
}

async fn write_state(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> StatusCode {
    state.puts.fetch_add(1, Ordering::SeqCst);
    *state.last_put.lock().unwrap() = Some(body);
    StatusCode::OK
}

/// Device configuration with `lights` sub-light descriptors
pub fn device_config(mac: &str, lights: usize) -> DeviceConfig {
    DeviceConfig {
        mac: mac.to_string(),
        n: "Lamp".to_string(),
        sub: vec![Default::default(); lights],
        addr: Ipv4Addr::new(192, 168, 1, 50),
        gw: Ipv4Addr::new(192, 168, 1, 1),
        mask: Ipv4Addr::new(255, 255, 255, 0),
    }
}

/// Accessories matching `device_config`
pub fn accessories_for(config: &DeviceConfig) -> Vec<Accessory> {
    let mut registry = lumen_core::AccessoryRegistry::new();
    registry.sync_device(config);
    registry.lights_for(config)
}
