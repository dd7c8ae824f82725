//! Configuration checksums used as device login credentials
//!
//! Each configured device gets an MD5 over the canonical JSON form of its
//! [`DeviceConfig`]. The device receives it through `GET /config` and must
//! echo it back on every login. Values are computed once per configuration
//! load and never on login.

use md5::{Digest, Md5};
use std::collections::HashMap;
use tracing::debug;

use crate::device::DeviceConfig;

/// Compute the checksum for a device configuration.
///
/// Serialization goes through the struct's fixed field order and sorted
/// descriptor maps, so the result is stable across restarts.
pub fn compute(config: &DeviceConfig) -> String {
    // DeviceConfig holds only strings, addresses and JSON values, none of
    // which can fail to serialize.
    let canonical = serde_json::to_vec(config).unwrap_or_default();
    hex::encode(Md5::digest(&canonical))
}

/// Checksums for every configured device, keyed by MAC
#[derive(Debug, Clone, Default)]
pub struct ChecksumRegistry {
    checksums: HashMap<String, String>,
}

impl ChecksumRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all checksums with those of the given configuration set
    pub fn load<'a>(&mut self, devices: impl IntoIterator<Item = &'a DeviceConfig>) {
        self.checksums.clear();
        for device in devices {
            let checksum = compute(device);
            debug!(mac = %device.mac, checksum = %checksum, "Computed configuration checksum");
            self.checksums.insert(device.mac.clone(), checksum);
        }
    }

    /// Checksum on file for a MAC, if any
    pub fn lookup(&self, mac: &str) -> Option<&str> {
        self.checksums
            .get(mac)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Exact comparison of a presented checksum against the one on file
    pub fn matches(&self, mac: &str, presented: &str) -> bool {
        self.lookup(mac) == Some(presented)
    }
}
