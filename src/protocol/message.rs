//! Server-to-client message types.
//!
//! Every frame from the bridge is a JSON envelope of the form
//! `{"event": <kind>, "data": <payload>}`. State-bearing kinds feed the
//! store; `result` and `yaml` carry a request id and resolve a pending
//! correlated command.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::freq::FrequencyRegisters;
use crate::identifiers::RequestId;
use crate::model::{CoverStatus, DeviceConfig, DiscoveredDevice, LogEntry, RfPacket};

// ============================================================================
// ServerMessage
// ============================================================================

/// One inbound frame from the bridge.
///
/// # Format
///
/// ```json
/// { "event": "rf", "data": { "t": 1234, "src": "0xaabbcc", ... } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full replacement of the configured-device snapshot.
    Config(DeviceConfig),

    /// Full state snapshot; sent on (re)connect and periodic heartbeats so
    /// the client can always resynchronize from scratch.
    State(StateSnapshot),

    /// Incremental replacement of the cover list only.
    Covers(Vec<CoverStatus>),

    /// Incremental replacement of the discovered list only.
    Discovered(Vec<DiscoveredDevice>),

    /// One observed RF packet.
    Rf(RfPacket),

    /// Batch of device log lines, in device order.
    Log(Vec<LogEntry>),

    /// Raw packet dump snapshot.
    Packets(PacketDump),

    /// Scan state change.
    ScanStatus(ScanStatus),

    /// Correlated command acknowledgement.
    Result(CommandAck),

    /// Correlated YAML export response.
    Yaml(YamlPayload),
}

// ============================================================================
// Payloads
// ============================================================================

/// Atomic full-state snapshot.
///
/// Applying one replaces the device name, uptime, scanning flag, capture
/// flags, frequency, cover list, and discovered list in a single
/// transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Bridge device name.
    #[serde(default)]
    pub device: String,
    /// Milliseconds since device boot.
    #[serde(default)]
    pub uptime_ms: u64,
    /// Discovery scan running.
    #[serde(default)]
    pub scanning: bool,
    /// Log capture running.
    #[serde(default)]
    pub log_capture: bool,
    /// Raw packet dump running.
    #[serde(default)]
    pub dump_active: bool,
    /// Radio frequency registers.
    #[serde(default)]
    pub freq: FrequencyRegisters,
    /// Configured and adopted covers.
    #[serde(default)]
    pub covers: Vec<CoverStatus>,
    /// Discovered but unconfigured devices.
    #[serde(default)]
    pub discovered: Vec<DiscoveredDevice>,
}

/// Raw packet dump snapshot; replaces the dump view wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDump {
    /// Whether dump mode is currently active.
    #[serde(default)]
    pub dump_active: bool,
    /// Captured packets, oldest first.
    #[serde(default)]
    pub packets: Vec<RfPacket>,
}

/// Scan state notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanStatus {
    /// Discovery scan running.
    pub scanning: bool,
}

/// Acknowledgement of a correlated command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    /// Echo of the originating request id.
    pub id: RequestId,
    /// Whether the command succeeded.
    pub success: bool,
    /// Failure reason supplied by the bridge, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// YAML export carried by a correlated `get_yaml` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YamlPayload {
    /// Echo of the originating request id.
    pub id: RequestId,
    /// The exported YAML document.
    pub yaml: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_event() {
        let json = r#"{
            "event": "config",
            "data": {
                "device": "elero-bridge",
                "freq": {"freq2": "0x21", "freq1": "0x71", "freq0": "0x7a"},
                "blinds": [],
                "lights": []
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::Config(config) => assert_eq!(config.device, "elero-bridge"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rf_event() {
        let json = r#"{
            "event": "rf",
            "data": {
                "t": 5000,
                "src": "0x112233",
                "dst": "0x445566",
                "type": "0x44",
                "cmd": "0x20",
                "rssi": -64.0,
                "ch": 5
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        assert!(matches!(msg, ServerMessage::Rf(_)));
    }

    #[test]
    fn test_parse_scan_status() {
        let json = r#"{"event": "scan_status", "data": {"scanning": true}}"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::ScanStatus(status) => assert!(status.scanning),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_parse_result_ack() {
        let id = RequestId::generate();
        let json = format!(
            r#"{{"event": "result", "data": {{"id": "{id}", "success": false, "error": "scan already running"}}}}"#
        );
        let msg: ServerMessage = serde_json::from_str(&json).expect("parse");
        match msg {
            ServerMessage::Result(ack) => {
                assert_eq!(ack.id, id);
                assert!(!ack.success);
                assert_eq!(ack.error.as_deref(), Some("scan already running"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_an_error_not_a_panic() {
        assert!(serde_json::from_str::<ServerMessage>("{\"event\":\"bogus\"}").is_err());
        assert!(serde_json::from_str::<ServerMessage>("not json").is_err());
    }

    #[test]
    fn test_state_snapshot_defaults() {
        let json = r#"{"event": "state", "data": {"device": "hub"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).expect("parse");
        match msg {
            ServerMessage::State(snapshot) => {
                assert_eq!(snapshot.device, "hub");
                assert!(!snapshot.scanning);
                assert!(snapshot.covers.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
