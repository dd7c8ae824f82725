//! Application state management

use anyhow::{Context, Result};
use lumen_core::AccessoryRegistry;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::manager::SessionManager;
use crate::sync::StateSynchronizer;

/// Shared application state
pub struct AppState {
    /// Sessions, checksums and accessories
    pub manager: SessionManager,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let store = config.daemon.accessories_path.clone();
        let mut accessories = match &store {
            Some(path) => AccessoryRegistry::load_or_create(path)
                .with_context(|| format!("Failed to load accessories from {}", path.display()))?,
            None => AccessoryRegistry::new(),
        };

        // Reconcile saved accessories with the configured light layouts
        for device in &config.devices {
            accessories.sync_device(device);
        }
        if let Some(path) = &store {
            accessories
                .save(path)
                .with_context(|| format!("Failed to save accessories to {}", path.display()))?;
        }
        info!(
            devices = config.devices.len(),
            accessories = accessories.len(),
            "Accessories ready"
        );

        let sync = StateSynchronizer::new(config.daemon.device_port, config.daemon.request_timeout())
            .context("Failed to create device HTTP client")?;

        let manager = SessionManager::new(
            config.devices.clone(),
            accessories,
            sync,
            config.daemon.update_interval(),
        )
        .with_store(store);

        Ok(Arc::new(Self { manager, config }))
    }
}
