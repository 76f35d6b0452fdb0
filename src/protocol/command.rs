//! Client-to-server command types.
//!
//! Outbound frames are flat JSON objects discriminated by a `type` field.
//! Device actions and raw transmissions are fire-and-forget; everything in
//! [`RequestCommand`] additionally carries a generated request id that the
//! bridge echoes back in its `result`/`yaml` response.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use crate::error::{Error, Result};
use crate::freq::{hex_byte, try_parse_hex_byte, FrequencyRegisters};
use crate::identifiers::{DeviceAddress, RequestId};

// ============================================================================
// Constants
// ============================================================================

/// Default protocol bytes for raw transmissions, matching the values the
/// bridge uses for its own packets.
const DEFAULT_PAYLOAD_1: u8 = 0x00;
const DEFAULT_PAYLOAD_2: u8 = 0x04;
const DEFAULT_PCK_INF1: u8 = 0x6a;
const DEFAULT_PCK_INF2: u8 = 0x00;
const DEFAULT_HOP: u8 = 0x0a;

// ============================================================================
// CoverAction
// ============================================================================

/// Action verbs accepted by the generic device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverAction {
    /// Open the blind.
    Up,
    /// Close the blind.
    Down,
    /// Stop movement.
    Stop,
    /// Move to the tilt position.
    Tilt,
    /// Switch a light on.
    On,
    /// Switch a light off.
    Off,
}

// ============================================================================
// ClientMessage
// ============================================================================

/// Fire-and-forget outbound messages.
///
/// # Format
///
/// ```json
/// { "type": "cmd", "address": "0xaabbcc", "action": "up" }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Imperative device action.
    Cmd {
        /// Target device address.
        address: DeviceAddress,
        /// Action to perform.
        action: CoverAction,
    },

    /// Raw debug transmission with explicit protocol bytes.
    Raw(RawTransmit),
}

// ============================================================================
// RawTransmit
// ============================================================================

/// A raw debug transmission: every protocol byte spelled out.
///
/// Construct through [`RawTransmit::new`], which validates the hex input
/// locally so malformed debug commands are rejected before they ever reach
/// the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct RawTransmit {
    /// Target blind address.
    pub blind_address: DeviceAddress,
    /// Remote address to impersonate.
    pub remote_address: DeviceAddress,
    /// Radio channel.
    pub channel: u8,
    /// Command byte.
    #[serde(with = "hex_byte")]
    pub command: u8,
    /// First payload byte.
    #[serde(with = "hex_byte")]
    pub payload_1: u8,
    /// Second payload byte.
    #[serde(with = "hex_byte")]
    pub payload_2: u8,
    /// First packet-info byte.
    #[serde(with = "hex_byte")]
    pub pck_inf1: u8,
    /// Second packet-info byte.
    #[serde(with = "hex_byte")]
    pub pck_inf2: u8,
    /// Hop byte.
    #[serde(with = "hex_byte")]
    pub hop: u8,
}

impl RawTransmit {
    /// Builds a raw transmission from user-supplied hex strings.
    ///
    /// Structural validation only: the addresses and the command byte must
    /// be valid hex. Semantic validity of the resulting packet is the
    /// bridge's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for malformed hex input.
    pub fn new(
        blind_address: &str,
        remote_address: &str,
        channel: u8,
        command: &str,
    ) -> Result<Self> {
        let command = try_parse_hex_byte(command)
            .ok_or_else(|| Error::invalid_argument(format!("invalid command byte: {command:?}")))?;

        Ok(Self {
            blind_address: DeviceAddress::parse(blind_address)?,
            remote_address: DeviceAddress::parse(remote_address)?,
            channel,
            command,
            payload_1: DEFAULT_PAYLOAD_1,
            payload_2: DEFAULT_PAYLOAD_2,
            pck_inf1: DEFAULT_PCK_INF1,
            pck_inf2: DEFAULT_PCK_INF2,
            hop: DEFAULT_HOP,
        })
    }

    /// Overrides the payload bytes.
    #[must_use]
    pub const fn with_payload(mut self, payload_1: u8, payload_2: u8) -> Self {
        self.payload_1 = payload_1;
        self.payload_2 = payload_2;
        self
    }

    /// Overrides the packet-info bytes.
    #[must_use]
    pub const fn with_packet_info(mut self, pck_inf1: u8, pck_inf2: u8) -> Self {
        self.pck_inf1 = pck_inf1;
        self.pck_inf2 = pck_inf2;
        self
    }

    /// Overrides the hop byte.
    #[must_use]
    pub const fn with_hop(mut self, hop: u8) -> Self {
        self.hop = hop;
        self
    }
}

// ============================================================================
// RequestCommand
// ============================================================================

/// Correlated commands: each is sent with a request id and answered by a
/// `result` (or `yaml`) frame echoing that id.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestCommand {
    /// Start the discovery scan.
    ScanStart,
    /// Stop the discovery scan.
    ScanStop,
    /// Adopt a discovered device under a name.
    Adopt {
        /// Discovered device address.
        address: DeviceAddress,
        /// Display name to assign.
        name: String,
    },
    /// Update a cover's timing settings.
    Settings {
        /// Cover address.
        address: DeviceAddress,
        /// Full-open travel time in milliseconds.
        open_duration_ms: u32,
        /// Full-close travel time in milliseconds.
        close_duration_ms: u32,
        /// Status poll interval in milliseconds.
        poll_interval_ms: u32,
    },
    /// Export the current configuration as YAML.
    GetYaml,
    /// Start log capture.
    LogStart,
    /// Stop log capture.
    LogStop,
    /// Clear the captured log.
    LogClear,
    /// Program the radio frequency registers.
    SetFrequency(FrequencyRegisters),
    /// Start the raw packet dump.
    DumpStart,
    /// Stop the raw packet dump.
    DumpStop,
    /// Clear the captured dump.
    DumpClear,
}

// ============================================================================
// Request
// ============================================================================

/// A correlated request: command plus generated id.
///
/// # Format
///
/// ```json
/// { "type": "scan_start", "id": "550e8400-e29b-41d4-a716-446655440000" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier echoed back in the response.
    pub id: RequestId,

    /// The command itself, flattened next to the id.
    #[serde(flatten)]
    pub command: RequestCommand,
}

impl Request {
    /// Creates a request with an auto-generated id.
    #[inline]
    #[must_use]
    pub fn new(command: RequestCommand) -> Self {
        Self {
            id: RequestId::generate(),
            command,
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Union of everything the client transmits.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub(crate) enum Outbound {
    Message(ClientMessage),
    Request(Request),
}

// ============================================================================
// Tests
// ============================================================================
