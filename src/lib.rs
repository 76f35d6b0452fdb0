//! RF bridge client - WebSocket client for the Elero radio bridge.
//!
//! This library keeps a local, observable mirror of an embedded RF bridge
//! (an ESP-based gateway speaking the Elero 868 MHz shutter protocol) over
//! its single JSON-over-WebSocket endpoint.
//!
//! # Architecture
//!
//! The client follows a supervisor model:
//!
//! - **Client handle**: cheap clone, issues commands, awaits responses
//! - **Supervisor task**: owns the socket, the reconnect timer, and dispatch
//! - **Store**: shared state snapshot with change notification
//!
//! Key design principles:
//!
//! - One supervisor task per client, so there is never more than one live
//!   socket or pending reconnect timer
//! - Correlated requests carry a UUID the bridge echoes back; each resolves
//!   exactly once (response, error, or timeout)
//! - Unsolicited frames (`rf`, `log`, `covers`, ...) flow into the [`Store`],
//!   which readers observe through a revision counter
//!
//! # Quick Start
//!
//! ```no_run
//! use rfbridge_client::{BridgeClient, Endpoint, Result, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Store::new();
//!     let client = BridgeClient::new(Endpoint::new("bridge.local", false)?, store.clone());
//!     client.connect();
//!
//!     // Wait for the first state change, then read the mirror.
//!     let mut changes = store.subscribe();
//!     changes.changed().await.ok();
//!     println!("device: {:?}", store.read().device_name);
//!
//!     // Correlated command: resolves on the bridge's response.
//!     client.scan_start().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`BridgeClient`] handle and connection supervisor |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`freq`] | Radio frequency registers and hex-byte encoding |
//! | [`history`] | Bounded ring buffer for packet and log history |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`model`] | Domain types: packets, devices, state codes |
//! | [`protocol`] | WebSocket message types |
//! | [`store`] | Shared state mirror with change notification |

// ============================================================================
// Modules
// ============================================================================

/// Bridge client handle and connection supervisor.
///
/// Use [`BridgeClient::new`] to spawn the supervisor, then
/// [`BridgeClient::connect`] to open the transport.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Radio frequency registers and `0x`-prefixed hex-byte encoding.
pub mod freq;

/// Bounded ring buffer used for packet and log history.
pub mod history;

/// Type-safe identifiers: request ids and device addresses.
///
/// Newtype wrappers prevent mixing incompatible values at compile time.
pub mod identifiers;

/// Domain model: RF packets, state codes, device configuration.
pub mod model;

/// WebSocket protocol message types.
pub mod protocol;

/// Shared state mirror with change notification.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{BridgeClient, Endpoint, DEFAULT_COMMAND_TIMEOUT, RECONNECT_DELAY};

// Error types
pub use error::{Error, Result};

// Frequency types
pub use freq::FrequencyRegisters;

// History buffer
pub use history::History;

// Identifier types
pub use identifiers::{DeviceAddress, RequestId};

// Domain types
pub use model::{
    BlindConfig, CoverStatus, DeviceConfig, DeviceType, DiscoveredDevice, LightConfig, LogEntry,
    PacketType, RfPacket, StateCode,
};

// Protocol types
pub use protocol::{ClientMessage, CoverAction, RawTransmit, ServerMessage};

// Store types
pub use store::{
    ActiveTab, ClientState, DeviceFilter, DeviceTypeFilter, Store, ViewMode,
    LOG_HISTORY_CAPACITY, PACKET_HISTORY_CAPACITY,
};
