//! Lumen Core - Device configuration, checksums, and light state
//!
//! This crate provides the socket-free building blocks of the Lumen hub:
//! - Device configuration and the view sent to device firmware
//! - Configuration checksums used as login credentials
//! - Light state model and the device `/state` wire format
//! - Accessory identities for exposed light sub-units
//! - Control-plane request and reply packets

pub mod accessory;
pub mod checksum;
pub mod device;
pub mod light;
pub mod protocol;

pub use accessory::{Accessory, AccessoryRegistry, StoreError};
pub use checksum::ChecksumRegistry;
pub use device::{DeviceConfig, DeviceConfigView, SubLightDescriptor};
pub use light::{LightReport, LightState, ProtocolError, StateReport, StatusPacket};
pub use protocol::{ControlReply, LoginOutcome, LoginRequest, RegisterOutcome, RegisterRequest};
