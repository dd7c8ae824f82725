//! Light state model and the device `/state` wire format
//!
//! Devices report their state as one JSON object keyed by zero-based light
//! position (`{"0": {"on": true, "bri": 50, ...}}`) and accept partial updates
//! keyed by one-based light index (`{"1": {"bri": 80}}`). Inside the hub,
//! lights are addressed by their one-based index only; the string keys exist
//! only at this boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use thiserror::Error;

pub const BRIGHTNESS_RANGE: RangeInclusive<u16> = 0..=100;
pub const HUE_RANGE: RangeInclusive<u16> = 0..=360;
pub const SATURATION_RANGE: RangeInclusive<u16> = 0..=100;
pub const COLOR_TEMPERATURE_RANGE: RangeInclusive<u16> = 140..=500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("light key {0:?} is not an index")]
    InvalidLightKey(String),
    #[error("field {field} of light {light}: {reason}")]
    InvalidField {
        light: usize,
        field: &'static str,
        reason: &'static str,
    },
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u16,
        min: u16,
        max: u16,
    },
    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Last known state of one light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    #[serde(rename = "bri")]
    pub brightness: u16,
    pub hue: u16,
    #[serde(rename = "sat")]
    pub saturation: u16,
    #[serde(rename = "ct")]
    pub color_temperature: u16,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: 0,
            hue: 0,
            saturation: 0,
            color_temperature: *COLOR_TEMPERATURE_RANGE.start(),
        }
    }
}

impl LightState {
    /// Overwrite every field present in a pulled report
    pub fn merge_report(&mut self, report: &LightReport) {
        if let Some(on) = report.on {
            self.on = on;
        }
        if let Some(bri) = report.bri {
            self.brightness = bri;
        }
        if let Some(hue) = report.hue {
            self.hue = hue;
        }
        if let Some(sat) = report.sat {
            self.saturation = sat;
        }
        if let Some(ct) = report.ct {
            self.color_temperature = ct;
        }
    }

    /// Apply an outgoing delta locally before the device confirms it
    pub fn apply_packet(&mut self, packet: &StatusPacket) {
        if let Some(on) = packet.on {
            self.on = on;
        }
        if let Some(bri) = packet.bri {
            self.brightness = bri;
        }
        if let Some(hue) = packet.hue {
            self.hue = hue;
        }
        if let Some(sat) = packet.sat {
            self.saturation = sat;
        }
        if let Some(ct) = packet.ct {
            self.color_temperature = ct;
        }
    }
}

/// Partial light state sent to a device; absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPacket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

impl StatusPacket {
    /// Decode an inbound packet; `on` must be a JSON boolean.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let packet: Self =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Json(e.to_string()))?;
        packet.validate()?;
        Ok(packet)
    }

    /// Check every present field against its range
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_range("bri", self.bri, &BRIGHTNESS_RANGE)?;
        check_range("hue", self.hue, &HUE_RANGE)?;
        check_range("sat", self.sat, &SATURATION_RANGE)?;
        check_range("ct", self.ct, &COLOR_TEMPERATURE_RANGE)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Wire body for `PUT /state` targeting one light
    pub fn to_wire(&self, light: usize) -> Value {
        let mut body = Map::new();
        // Serializing a struct of options cannot fail.
        body.insert(
            light.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(body)
    }
}

fn check_range(
    field: &'static str,
    value: Option<u16>,
    range: &RangeInclusive<u16>,
) -> Result<(), ProtocolError> {
    match value {
        Some(v) if !range.contains(&v) => Err(ProtocolError::OutOfRange {
            field,
            value: v,
            min: *range.start(),
            max: *range.end(),
        }),
        _ => Ok(()),
    }
}

/// Fields one light reported in a `/state` response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightReport {
    pub on: Option<bool>,
    pub bri: Option<u16>,
    pub hue: Option<u16>,
    pub sat: Option<u16>,
    pub ct: Option<u16>,
}

impl LightReport {
    /// Whether every expected field was present
    pub fn is_complete(&self) -> bool {
        self.on.is_some()
            && self.bri.is_some()
            && self.hue.is_some()
            && self.sat.is_some()
            && self.ct.is_some()
    }

    fn decode(light: usize, object: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let on = match object.get("on") {
            None => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                return Err(ProtocolError::InvalidField {
                    light,
                    field: "on",
                    reason: "expected a boolean",
                })
            }
        };

        Ok(Self {
            on,
            bri: decode_number(light, object, "bri", &BRIGHTNESS_RANGE)?,
            hue: decode_number(light, object, "hue", &HUE_RANGE)?,
            sat: decode_number(light, object, "sat", &SATURATION_RANGE)?,
            ct: decode_number(light, object, "ct", &COLOR_TEMPERATURE_RANGE)?,
        })
    }
}

/// Round to the nearest integer and clamp into the field's range
fn decode_number(
    light: usize,
    object: &Map<String, Value>,
    field: &'static str,
    range: &RangeInclusive<u16>,
) -> Result<Option<u16>, ProtocolError> {
    match object.get(field) {
        None => Ok(None),
        Some(value) => {
            let n = value.as_f64().ok_or(ProtocolError::InvalidField {
                light,
                field,
                reason: "expected a number",
            })?;
            let clamped = n
                .round()
                .clamp(f64::from(*range.start()), f64::from(*range.end()));
            Ok(Some(clamped as u16))
        }
    }
}

/// Full state snapshot returned by `GET /state`, indexed by one-based light index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateReport {
    lights: BTreeMap<usize, LightReport>,
}

impl StateReport {
    /// Decode a raw response body
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Json(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Decode the string-keyed wire object
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;
        let mut lights = BTreeMap::new();

        for (key, entry) in object {
            let position: usize = key
                .trim()
                .parse()
                .map_err(|_| ProtocolError::InvalidLightKey(key.clone()))?;
            let light = position
                .checked_add(1)
                .ok_or_else(|| ProtocolError::InvalidLightKey(key.clone()))?;
            let fields = entry.as_object().ok_or(ProtocolError::InvalidField {
                light,
                field: "light",
                reason: "expected an object",
            })?;
            lights.insert(light, LightReport::decode(light, fields)?);
        }

        Ok(Self { lights })
    }

    /// Report for a one-based light index
    pub fn light(&self, index: usize) -> Option<&LightReport> {
        self.lights.get(&index)
    }
}
