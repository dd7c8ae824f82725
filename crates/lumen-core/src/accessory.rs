//! Hub-side accessory identities
//!
//! Every light sub-unit the hub exposes is an accessory with a stable UUID
//! derived from a seed string. Single-light devices use the bare MAC as seed;
//! multi-light devices use `<mac>_<index>`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::DeviceConfig;
use crate::protocol::RegisterOutcome;

/// Highest per-light seed suffix swept when a device turns single-light
const MAX_STALE_SUFFIX: usize = 9;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One exposed light sub-unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accessory {
    pub id: Uuid,
    pub name: String,
    pub seed: String,
    /// One-based light index on the owning device
    pub light: usize,
}

impl Accessory {
    pub fn new(name: impl Into<String>, seed: impl Into<String>, light: usize) -> Self {
        let seed = seed.into();
        Self {
            id: accessory_id(&seed),
            name: name.into(),
            seed,
            light,
        }
    }
}

/// Deterministic accessory UUID for a seed
pub fn accessory_id(seed: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
}

/// Seed of light `index` on a multi-light device
pub fn light_seed(mac: &str, index: usize) -> String {
    format!("{mac}_{index}")
}

/// Accessories keyed by UUID
#[derive(Debug, Clone, Default)]
pub struct AccessoryRegistry {
    accessories: HashMap<Uuid, Accessory>,
}

impl AccessoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load accessories saved by [`AccessoryRegistry::save`]
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let saved: Vec<Accessory> = serde_json::from_str(&content)?;

        let mut registry = Self::new();
        for accessory in saved {
            // Identity always follows the seed, whatever the file says.
            let id = accessory_id(&accessory.seed);
            registry.accessories.insert(id, Accessory { id, ..accessory });
        }
        debug!(path = %path.display(), accessories = registry.len(), "Loaded accessories");
        Ok(registry)
    }

    /// Load saved accessories, or start empty if nothing was saved yet
    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Write every accessory to `path` as JSON, sorted by seed
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.list())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Look up an accessory by seed
    pub fn find(&self, seed: &str) -> Option<&Accessory> {
        self.accessories.get(&accessory_id(seed))
    }

    /// Create the accessory for `seed` unless it already exists
    pub fn ensure(&mut self, name: &str, seed: &str, light: usize) -> &Accessory {
        self.accessories
            .entry(accessory_id(seed))
            .or_insert_with(|| {
                debug!(seed = %seed, light, "Adding accessory");
                Accessory::new(name, seed, light)
            })
    }

    /// Drop the accessory for `seed`, returning it if present
    pub fn remove(&mut self, seed: &str) -> Option<Accessory> {
        let removed = self.accessories.remove(&accessory_id(seed));
        if removed.is_some() {
            debug!(seed = %seed, "Removed stale accessory");
        }
        removed
    }

    /// Runtime registration of a single-light device
    pub fn register(&mut self, name: &str, mac: &str) -> RegisterOutcome {
        if self.find(mac).is_some() {
            return RegisterOutcome::AlreadyRegistered;
        }
        self.ensure(name, mac, 1);
        info!(mac = %mac, name = %name, "Registered new device");
        RegisterOutcome::Success
    }

    /// Reconcile accessories with a device's configured light layout
    pub fn sync_device(&mut self, config: &DeviceConfig) {
        if config.is_multi_light() {
            self.remove(&config.mac);
            for index in 1..=config.light_count() {
                let name = format!("{}_{}", config.n, index);
                self.ensure(&name, &light_seed(&config.mac, index), index);
            }
        } else {
            for index in 1..=MAX_STALE_SUFFIX {
                self.remove(&light_seed(&config.mac, index));
            }
            self.ensure(&config.n, &config.mac, 1);
        }
    }

    /// Accessories backing every light of a device, in light order.
    ///
    /// Empty when any expected accessory is missing.
    pub fn lights_for(&self, config: &DeviceConfig) -> Vec<Accessory> {
        let seeds: Vec<String> = if config.is_multi_light() {
            (1..=config.light_count())
                .map(|i| light_seed(&config.mac, i))
                .collect()
        } else {
            vec![config.mac.clone()]
        };

        let found: Option<Vec<Accessory>> =
            seeds.iter().map(|seed| self.find(seed).cloned()).collect();
        found.unwrap_or_default()
    }

    /// All accessories sorted by seed
    pub fn list(&self) -> Vec<Accessory> {
        let mut all: Vec<Accessory> = self.accessories.values().cloned().collect();
        all.sort_by(|a, b| a.seed.cmp(&b.seed));
        all
    }

    pub fn len(&self) -> usize {
        self.accessories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessories.is_empty()
    }
}
