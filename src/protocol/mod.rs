//! Wire protocol message types.
//!
//! The bridge speaks JSON over a single WebSocket. Byte-level fields are
//! `0x`-prefixed hex strings in both directions, never binary.
//!
//! # Message Kinds
//!
//! | Direction | Kinds |
//! |-----------|-------|
//! | Server → Client | `config`, `state`, `covers`, `discovered`, `rf`, `log`, `packets`, `scan_status`, `result`, `yaml` |
//! | Client → Server | `cmd`, `raw`, and the correlated requests (`scan_start`, `adopt`, `settings`, ...) |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Client-to-server commands and correlated requests |
//! | `message` | Server-to-client envelope and payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Client-to-server command types.
pub mod command;

/// Server-to-client message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{ClientMessage, CoverAction, RawTransmit, Request, RequestCommand};
pub use message::{
    CommandAck, PacketDump, ScanStatus, ServerMessage, StateSnapshot, YamlPayload,
};

pub(crate) use command::Outbound;
