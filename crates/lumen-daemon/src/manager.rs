//! Session manager: configuration, checksums, accessories and live sessions

use lumen_core::{
    Accessory, AccessoryRegistry, ChecksumRegistry, DeviceConfig, DeviceConfigView, LoginOutcome,
    RegisterOutcome,
};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::session::{DeviceSession, SessionStatus};
use crate::sync::StateSynchronizer;

/// Owns every configured device and its session.
///
/// The session table is built once at startup; only runtime registration
/// mutates state afterwards, and that goes through the accessory lock.
pub struct SessionManager {
    configs: BTreeMap<String, DeviceConfig>,
    checksums: ChecksumRegistry,
    sessions: BTreeMap<String, Arc<DeviceSession>>,
    accessories: RwLock<AccessoryRegistry>,
    store: Option<PathBuf>,
}

impl SessionManager {
    /// Build sessions for every device whose accessories are all present
    pub fn new(
        devices: Vec<DeviceConfig>,
        accessories: AccessoryRegistry,
        sync: StateSynchronizer,
        period: Duration,
    ) -> Self {
        let mut checksums = ChecksumRegistry::new();
        checksums.load(&devices);

        let mut sessions = BTreeMap::new();
        for device in &devices {
            let lights = accessories.lights_for(device);
            match DeviceSession::new(device.clone(), lights, sync.clone(), period) {
                Ok(session) => {
                    debug!(mac = %device.mac, lights = session.accessories().len(), "Session ready");
                    sessions.insert(device.mac.clone(), session);
                }
                Err(e) => error!(mac = %device.mac, error = %e, "Could not start device session"),
            }
        }

        let configs = devices
            .into_iter()
            .map(|device| (device.mac.clone(), device))
            .collect();

        Self {
            configs,
            checksums,
            sessions,
            accessories: RwLock::new(accessories),
            store: None,
        }
    }

    /// Save accessories to `store` whenever a registration changes them
    pub fn with_store(mut self, store: Option<PathBuf>) -> Self {
        self.store = store;
        self
    }

    /// Validate a login and bring the session up.
    ///
    /// The checksum is checked before anything else, so a logged-in device
    /// presenting a stale checksum is still rejected. Devices are reached
    /// over IPv4 only; any other peer fails after its credentials pass.
    pub async fn login(&self, mac: &str, checksum: &str, peer: IpAddr) -> LoginOutcome {
        if self.checksums.lookup(mac).is_none() {
            debug!(mac = %mac, "Login from unknown device");
            return LoginOutcome::NotRegistered;
        }
        if !self.checksums.matches(mac, checksum) {
            warn!(mac = %mac, peer = %peer, "Login with outdated configuration checksum");
            return LoginOutcome::WrongChecksum;
        }

        let IpAddr::V4(ip) = peer.to_canonical() else {
            warn!(mac = %mac, peer = %peer, "Devices must connect over IPv4");
            return LoginOutcome::InternalError;
        };

        match self.sessions.get(mac) {
            Some(session) => {
                session.login(ip).await;
                LoginOutcome::Success
            }
            None => {
                error!(mac = %mac, "Checksum accepted but device has no session");
                LoginOutcome::InternalError
            }
        }
    }

    /// Register a single-light device at runtime
    pub async fn register(&self, name: &str, mac: &str) -> RegisterOutcome {
        let mut accessories = self.accessories.write().await;
        let outcome = accessories.register(name, mac);
        if outcome == RegisterOutcome::AlreadyRegistered {
            debug!(mac = %mac, "Device already registered");
            return outcome;
        }

        if let Some(path) = &self.store {
            if let Err(e) = accessories.save(path) {
                warn!(path = %path.display(), error = %e, "Failed to save accessories");
            }
        }
        outcome
    }

    pub fn get_checksum(&self, mac: &str) -> Option<&str> {
        self.checksums.lookup(mac)
    }

    /// Configuration as served on `GET /config`
    pub fn config_view(&self, mac: &str) -> Option<DeviceConfigView> {
        let config = self.configs.get(mac)?;
        let checksum = self.get_checksum(mac).unwrap_or_default().to_string();
        Some(config.to_view(checksum))
    }

    pub fn session(&self, mac: &str) -> Option<&Arc<DeviceSession>> {
        self.sessions.get(mac)
    }

    pub async fn statuses(&self) -> Vec<SessionStatus> {
        let mut statuses = Vec::with_capacity(self.sessions.len());
        for session in self.sessions.values() {
            statuses.push(session.status().await);
        }
        statuses
    }

    pub async fn accessories(&self) -> Vec<Accessory> {
        self.accessories.read().await.list()
    }

    /// Log out every session, stopping all heartbeat schedules
    pub async fn shutdown(&self) {
        let mut logged_out = 0;
        for session in self.sessions.values() {
            if session.is_logged_in().await {
                session.logout().await;
                logged_out += 1;
            }
        }
        info!(logged_out, "All sessions logged out");
    }
}
