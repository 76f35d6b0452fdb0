//! Domain model for the bridge's devices and observed traffic.
//!
//! Everything here mirrors what the bridge reports over the wire: configured
//! blinds and lights, one RF packet per observed radio transaction, device
//! log lines, and the discovery lists. Byte-level fields travel as
//! `0x`-prefixed hex strings and deserialize through the [`crate::freq`]
//! helpers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::freq::{hex_byte, hex_byte_opt, FrequencyRegisters};
use crate::identifiers::DeviceAddress;

// ============================================================================
// PacketType
// ============================================================================

/// Wire-level packet discriminator of an observed RF transaction.
///
/// Known values: `0x44` button press from a remote, `0x6a` controller
/// command, `0xca`/`0xc9` status responses. Unknown values are preserved so
/// a raw dump stays faithful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Button press transmitted by a hand-held remote (`0x44`).
    ButtonPress,
    /// Command sent by a controller (`0x6a`).
    Command,
    /// Status response, variant A (`0xca`).
    StatusA,
    /// Status response, variant B (`0xc9`).
    StatusB,
    /// Any other packet type byte.
    Other(u8),
}

impl PacketType {
    /// Returns the raw type byte.
    #[inline]
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            Self::ButtonPress => 0x44,
            Self::Command => 0x6a,
            Self::StatusA => 0xca,
            Self::StatusB => 0xc9,
            Self::Other(b) => b,
        }
    }

    /// Maps a raw byte onto the known packet types.
    #[inline]
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x44 => Self::ButtonPress,
            0x6a => Self::Command,
            0xca => Self::StatusA,
            0xc9 => Self::StatusB,
            other => Self::Other(other),
        }
    }

    /// Returns `true` for either status-response variant.
    #[inline]
    #[must_use]
    pub const fn is_status(self) -> bool {
        matches!(self, Self::StatusA | Self::StatusB)
    }
}

impl Serialize for PacketType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex_byte::serialize(&self.byte(), serializer)
    }
}

impl<'de> Deserialize<'de> for PacketType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex_byte::deserialize(deserializer).map(Self::from_byte)
    }
}

// ============================================================================
// StateCode
// ============================================================================

/// A device state byte as reported in status responses.
///
/// The wire protocol overloads `0x0f`: it means BOTTOM_TILT for a blind and
/// OFF for a light. Only `0x10` (ON) is unique to lights, which is why the
/// device-type heuristic keys on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateCode(pub u8);

impl StateCode {
    pub const UNKNOWN: Self = Self(0x00);
    pub const TOP: Self = Self(0x01);
    pub const BOTTOM: Self = Self(0x02);
    pub const INTERMEDIATE: Self = Self(0x03);
    pub const TILT: Self = Self(0x04);
    pub const BLOCKING: Self = Self(0x05);
    pub const OVERHEATED: Self = Self(0x06);
    pub const TIMEOUT: Self = Self(0x07);
    pub const START_MOVING_UP: Self = Self(0x08);
    pub const START_MOVING_DOWN: Self = Self(0x09);
    pub const MOVING_UP: Self = Self(0x0a);
    pub const MOVING_DOWN: Self = Self(0x0b);
    pub const STOPPED: Self = Self(0x0d);
    pub const TOP_TILT: Self = Self(0x0e);
    /// Shared wire code: blind bottom-tilt and light off.
    pub const BOTTOM_TILT: Self = Self(0x0f);
    pub const ON: Self = Self(0x10);

    /// Human-readable label for the known state codes.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::UNKNOWN => "UNKNOWN",
            Self::TOP => "TOP",
            Self::BOTTOM => "BOTTOM",
            Self::INTERMEDIATE => "INTERMEDIATE",
            Self::TILT => "TILT",
            Self::BLOCKING => "BLOCKING",
            Self::OVERHEATED => "OVERHEATED",
            Self::TIMEOUT => "TIMEOUT",
            Self::START_MOVING_UP => "START_MOVING_UP",
            Self::START_MOVING_DOWN => "START_MOVING_DOWN",
            Self::MOVING_UP => "MOVING_UP",
            Self::MOVING_DOWN => "MOVING_DOWN",
            Self::STOPPED => "STOPPED",
            Self::TOP_TILT => "TOP_TILT",
            Self::BOTTOM_TILT => "BOTTOM_TILT",
            Self::ON => "ON",
            _ => "UNKNOWN",
        }
    }

    /// Returns `true` while the device reports movement.
    #[inline]
    #[must_use]
    pub const fn is_moving(self) -> bool {
        matches!(self.0, 0x08..=0x0b)
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for StateCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex_byte::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for StateCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex_byte::deserialize(deserializer).map(Self)
    }
}

// ============================================================================
// RfPacket
// ============================================================================

/// One observed radio transaction, as reported by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfPacket {
    /// Device-relative timestamp in milliseconds.
    pub t: u64,

    /// Source address.
    pub src: DeviceAddress,

    /// Destination address.
    pub dst: DeviceAddress,

    /// Packet type discriminator.
    #[serde(rename = "type")]
    pub packet_type: PacketType,

    /// Command byte (present on outgoing controller commands).
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<u8>,

    /// Reported state (present on status responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCode>,

    /// Signal strength in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f32>,

    /// Radio channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ch: Option<u8>,

    /// Hop byte, when the bridge includes it.
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub hop: Option<u8>,

    /// Raw payload bytes as a space-separated hex string, dump mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

// ============================================================================
// LogEntry
// ============================================================================

/// One device log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Device-relative timestamp in milliseconds.
    pub t: u64,
    /// Severity: 1 = error, 2 = warning, 3 and above = info.
    pub level: u8,
    /// Free-form category tag.
    pub tag: String,
    /// Message text.
    pub msg: String,
}

impl LogEntry {
    /// Returns `true` for error-level entries.
    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.level == 1
    }

    /// Returns `true` for warning-level entries.
    #[inline]
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        self.level == 2
    }
}

// ============================================================================
// Device Configuration
// ============================================================================

/// A configured blind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlindConfig {
    /// Blind address.
    pub address: DeviceAddress,
    /// Display name.
    pub name: String,
    /// Radio channel.
    pub channel: u8,
    /// Paired remote address.
    pub remote: DeviceAddress,
    /// Full-open travel time in milliseconds.
    pub open_ms: u32,
    /// Full-close travel time in milliseconds.
    pub close_ms: u32,
    /// Status poll interval in milliseconds.
    pub poll_ms: u32,
    /// Whether the blind supports tilt.
    #[serde(default)]
    pub tilt: bool,
}

/// A configured light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    /// Light address.
    pub address: DeviceAddress,
    /// Display name.
    pub name: String,
    /// Radio channel.
    pub channel: u8,
    /// Paired remote address.
    pub remote: DeviceAddress,
    /// Dim transition time in milliseconds.
    pub dim_ms: u32,
}

/// Snapshot of the bridge's configured peripherals.
///
/// Replaced wholesale when a `config` message arrives; never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bridge device name.
    #[serde(default)]
    pub device: String,
    /// Configured blinds, in the bridge's order.
    #[serde(default)]
    pub blinds: Vec<BlindConfig>,
    /// Configured lights, in the bridge's order.
    #[serde(default)]
    pub lights: Vec<LightConfig>,
    /// Radio frequency registers.
    #[serde(default)]
    pub freq: FrequencyRegisters,
}

impl DeviceConfig {
    /// Looks up a configured device's type by address.
    ///
    /// Addresses are unique across the union of blinds and lights.
    #[must_use]
    pub fn configured_type(&self, address: &DeviceAddress) -> Option<DeviceType> {
        if self.blinds.iter().any(|b| &b.address == address) {
            return Some(DeviceType::Blind);
        }
        if self.lights.iter().any(|l| &l.address == address) {
            return Some(DeviceType::Light);
        }
        None
    }
}

// ============================================================================
// Covers and Discovery
// ============================================================================

/// A configured or adopted cover as reported by the bridge's cover list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverStatus {
    /// Cover address.
    pub blind_address: DeviceAddress,
    /// Display name.
    pub name: String,
    /// Radio channel.
    pub channel: u8,
    /// Paired remote address.
    pub remote_address: DeviceAddress,
    /// Full-open travel time in milliseconds.
    pub open_duration_ms: u32,
    /// Full-close travel time in milliseconds.
    pub close_duration_ms: u32,
    /// Status poll interval in milliseconds.
    pub poll_interval_ms: u32,
    /// Observed protocol bytes, kept for raw retransmission and YAML export.
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub payload_1: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub payload_2: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub pck_inf1: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub pck_inf2: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub hop: Option<u8>,
    /// Last reported state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateCode>,
    /// Device timestamp of the last state report, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_time: Option<u64>,
}

/// An address observed in traffic but absent from the configured list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Observed device address.
    pub blind_address: DeviceAddress,
    /// Radio channel it was seen on.
    pub channel: u8,
    /// Remote address that addressed it.
    pub remote_address: DeviceAddress,
    /// Observed protocol bytes, kept for adoption and YAML export.
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub payload_1: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub payload_2: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub pck_inf1: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub pck_inf2: Option<u8>,
    #[serde(default, with = "hex_byte_opt", skip_serializing_if = "Option::is_none")]
    pub hop: Option<u8>,
    /// Present in the bridge's static configuration.
    #[serde(default)]
    pub already_configured: bool,
    /// Adopted at runtime through the web client.
    #[serde(default)]
    pub already_adopted: bool,
}

// ============================================================================
// Device-Type Inference
// ============================================================================

/// Semantic device category derived from observed traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Motorized cover.
    Blind,
    /// Dimmable or switchable light.
    Light,
    /// Hand-held remote control.
    Remote,
    /// No classifying traffic observed.
    Unknown,
}

/// Derives a device category from an address's role in captured traffic.
///
/// Scans the history in insertion order; the earliest classifying packet
/// wins:
///
/// 1. The address sends button presses: it is a remote.
/// 2. The address sends status responses: state ON (`0x10`) is unique to
///    lights; every other state is conservatively a blind, because `0x0f`
///    doubles as light-off and blind-bottom-tilt on the wire. A light that
///    reports OFF before it ever reports ON is therefore misclassified;
///    that ambiguity is in the protocol itself.
/// 3. No matching packet: unknown.
///
/// Best-effort only. Configured devices take their type from
/// [`DeviceConfig`]; inference is consulted for discovered addresses.
#[must_use]
pub fn infer_device_type<'a, I>(history: I, address: &DeviceAddress) -> DeviceType
where
    I: IntoIterator<Item = &'a RfPacket>,
{
    for packet in history {
        if &packet.src != address {
            continue;
        }
        if packet.packet_type == PacketType::ButtonPress {
            return DeviceType::Remote;
        }
        if packet.packet_type.is_status() {
            return if packet.state == Some(StateCode::ON) {
                DeviceType::Light
            } else {
                DeviceType::Blind
            };
        }
    }
    DeviceType::Unknown
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DeviceAddress {
        DeviceAddress::parse(s).expect("valid address")
    }

    fn status_packet(src: &str, state: StateCode) -> RfPacket {
        RfPacket {
            t: 1000,
            src: addr(src),
            dst: addr("0x000001"),
            packet_type: PacketType::StatusA,
            cmd: None,
            state: Some(state),
            rssi: Some(-72.5),
            ch: Some(5),
            hop: None,
            raw: None,
        }
    }

    fn button_packet(src: &str) -> RfPacket {
        RfPacket {
            t: 1000,
            src: addr(src),
            dst: addr("0x000001"),
            packet_type: PacketType::ButtonPress,
            cmd: Some(0x20),
            state: None,
            rssi: Some(-60.0),
            ch: Some(5),
            hop: None,
            raw: None,
        }
    }

    #[test]
    fn test_packet_type_roundtrip() {
        for byte in [0x44u8, 0x6a, 0xca, 0xc9, 0x17] {
            assert_eq!(PacketType::from_byte(byte).byte(), byte);
        }
        assert!(PacketType::StatusB.is_status());
        assert!(!PacketType::ButtonPress.is_status());
    }

    #[test]
    fn test_state_code_labels() {
        assert_eq!(StateCode::ON.label(), "ON");
        assert_eq!(StateCode::BOTTOM_TILT.label(), "BOTTOM_TILT");
        assert_eq!(StateCode(0x42).label(), "UNKNOWN");
        assert!(StateCode::MOVING_UP.is_moving());
        assert!(!StateCode::STOPPED.is_moving());
    }

    #[test]
    fn test_rf_packet_deserialize() {
        let json = r#"{
            "t": 12345,
            "src": "0xAABBCC",
            "dst": "0x112233",
            "type": "0xca",
            "state": "0x0a",
            "rssi": -71.5,
            "ch": 3
        }"#;
        let packet: RfPacket = serde_json::from_str(json).expect("parse");
        assert_eq!(packet.src.as_str(), "0xaabbcc");
        assert_eq!(packet.packet_type, PacketType::StatusA);
        assert_eq!(packet.state, Some(StateCode::MOVING_UP));
        assert_eq!(packet.cmd, None);
    }

    #[test]
    fn test_infer_remote_from_button_press() {
        let history = vec![button_packet("0x111111")];
        assert_eq!(
            infer_device_type(&history, &addr("0x111111")),
            DeviceType::Remote
        );
    }

    #[test]
    fn test_infer_light_from_on_state() {
        let history = vec![status_packet("0x222222", StateCode::ON)];
        assert_eq!(
            infer_device_type(&history, &addr("0x222222")),
            DeviceType::Light
        );
    }

    #[test]
    fn test_infer_blind_from_other_state() {
        let history = vec![status_packet("0x333333", StateCode::BOTTOM_TILT)];
        assert_eq!(
            infer_device_type(&history, &addr("0x333333")),
            DeviceType::Blind
        );
    }

    #[test]
    fn test_infer_unknown_without_traffic() {
        let history = vec![status_packet("0x444444", StateCode::TOP)];
        assert_eq!(
            infer_device_type(&history, &addr("0x555555")),
            DeviceType::Unknown
        );
    }

    #[test]
    fn test_infer_first_evidence_wins() {
        // A button press observed first pins the address as a remote even
        // if later packets look like status responses.
        let history = vec![
            button_packet("0x666666"),
            status_packet("0x666666", StateCode::ON),
        ];
        assert_eq!(
            infer_device_type(&history, &addr("0x666666")),
            DeviceType::Remote
        );
    }

    #[test]
    fn test_configured_type_lookup() {
        let config = DeviceConfig {
            device: "bridge".into(),
            blinds: vec![BlindConfig {
                address: addr("0xaaaaaa"),
                name: "Kitchen".into(),
                channel: 1,
                remote: addr("0xbbbbbb"),
                open_ms: 25_000,
                close_ms: 22_000,
                poll_ms: 300_000,
                tilt: false,
            }],
            lights: vec![LightConfig {
                address: addr("0xcccccc"),
                name: "Porch".into(),
                channel: 2,
                remote: addr("0xdddddd"),
                dim_ms: 1_000,
            }],
            freq: FrequencyRegisters::default(),
        };

        assert_eq!(
            config.configured_type(&addr("0xaaaaaa")),
            Some(DeviceType::Blind)
        );
        assert_eq!(
            config.configured_type(&addr("0xcccccc")),
            Some(DeviceType::Light)
        );
        assert_eq!(config.configured_type(&addr("0x999999")), None);
    }
}
