//! Device configuration as supplied by the hub operator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Opaque descriptor of one sub-light, forwarded to the device verbatim.
///
/// Keys are kept sorted so the serialized form stays canonical.
pub type SubLightDescriptor = BTreeMap<String, serde_json::Value>;

/// Static configuration of one device, identified by its MAC address.
///
/// Field order is part of the checksum contract: changing it changes every
/// device's checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier
    pub mac: String,
    /// Human-readable name
    pub n: String,
    /// Sub-light descriptors; empty means a single implicit light
    #[serde(default)]
    pub sub: Vec<SubLightDescriptor>,
    /// Static address the device should use
    pub addr: Ipv4Addr,
    /// Gateway
    pub gw: Ipv4Addr,
    /// Network mask
    pub mask: Ipv4Addr,
}

impl DeviceConfig {
    /// Number of light sub-units this device controls
    pub fn light_count(&self) -> usize {
        self.sub.len().max(1)
    }

    /// Whether this device exposes more than one light
    pub fn is_multi_light(&self) -> bool {
        self.sub.len() > 1
    }

    /// Build the view sent to the device on `GET /config`
    pub fn to_view(&self, checksum: String) -> DeviceConfigView {
        DeviceConfigView {
            n: self.n.clone(),
            sub: self.sub.clone(),
            addr: self.addr.octets(),
            gw: self.gw.octets(),
            mask: self.mask.octets(),
            su: self.sub.len(),
            md5: checksum,
        }
    }
}

/// Configuration as the device firmware expects it: no MAC, addresses as
/// octet arrays, the sub-light count and the current checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfigView {
    pub n: String,
    pub sub: Vec<SubLightDescriptor>,
    pub addr: [u8; 4],
    pub gw: [u8; 4],
    pub mask: [u8; 4],
    pub su: usize,
    pub md5: String,
}
