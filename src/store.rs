//! State reconciliation store.
//!
//! The single source of truth for everything the client mirrors from the
//! bridge: connection status, device configuration, per-device last-known
//! telemetry, bounded packet/log history, and UI selection state.
//!
//! All writes go through named operations on [`Store`]; each one takes the
//! write lock once, so readers never observe a half-applied snapshot.
//! Change notification is a `watch` revision counter: subscribers wake on
//! any mutation and re-read whatever they project from the state.
//!
//! History buffers deliberately survive reconnects: they mirror
//! device-observed history, not session history.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::freq::FrequencyRegisters;
use crate::history::History;
use crate::identifiers::DeviceAddress;
use crate::model::{
    infer_device_type, CoverStatus, DeviceConfig, DeviceType, DiscoveredDevice, LogEntry, RfPacket,
};
use crate::protocol::{PacketDump, StateSnapshot};

// ============================================================================
// Constants
// ============================================================================

/// RF packet history capacity.
pub const PACKET_HISTORY_CAPACITY: usize = 200;

/// Device log history capacity.
pub const LOG_HISTORY_CAPACITY: usize = 500;

// ============================================================================
// UI Selection Types
// ============================================================================

/// Active view tab. Pure UI projection state; no protocol effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    #[default]
    Devices,
    Packets,
    Logs,
    Hub,
}

/// Device list layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

/// Configured-versus-discovered filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFilter {
    #[default]
    All,
    Configured,
    Discovered,
}

/// Blind-versus-light filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTypeFilter {
    #[default]
    All,
    Blinds,
    Lights,
}

// ============================================================================
// ClientState
// ============================================================================

/// The mirrored bridge state. Read through [`Store::read`], written only by
/// the store's named operations.
#[derive(Debug, Clone)]
pub struct ClientState {
    /// Transport currently open.
    pub connected: bool,

    /// Configured peripherals, replaced wholesale by `config` messages.
    pub config: DeviceConfig,

    /// Bridge device name, from the last full snapshot.
    pub device_name: String,
    /// Milliseconds since device boot, from the last full snapshot.
    pub uptime_ms: u64,
    /// Discovery scan running.
    pub scanning: bool,
    /// Log capture running.
    pub log_capture: bool,
    /// Raw packet dump running.
    pub dump_active: bool,
    /// Radio frequency registers.
    pub freq: FrequencyRegisters,

    /// Configured and adopted covers.
    pub covers: Vec<CoverStatus>,
    /// Discovered but unconfigured devices.
    pub discovered: Vec<DiscoveredDevice>,

    /// Last known packet per source address; last write wins, no field
    /// merging.
    pub states: FxHashMap<DeviceAddress, RfPacket>,
    /// RF packet history, insertion order.
    pub packets: History<RfPacket>,
    /// Device log history, insertion order.
    pub logs: History<LogEntry>,
    /// Raw packet dump snapshot, replaced wholesale.
    pub dump_packets: Vec<RfPacket>,

    /// UI selection state.
    pub active_tab: ActiveTab,
    pub view_mode: ViewMode,
    pub device_filter: DeviceFilter,
    pub device_type_filter: DeviceTypeFilter,
    /// Free-text address filter for the packet view.
    pub rf_filter: String,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            connected: false,
            config: DeviceConfig::default(),
            device_name: String::new(),
            uptime_ms: 0,
            scanning: false,
            log_capture: false,
            dump_active: false,
            freq: FrequencyRegisters::default(),
            covers: Vec::new(),
            discovered: Vec::new(),
            states: FxHashMap::default(),
            packets: History::new(PACKET_HISTORY_CAPACITY),
            logs: History::new(LOG_HISTORY_CAPACITY),
            dump_packets: Vec::new(),
            active_tab: ActiveTab::default(),
            view_mode: ViewMode::default(),
            device_filter: DeviceFilter::default(),
            device_type_filter: DeviceTypeFilter::default(),
            rf_filter: String::new(),
        }
    }
}

impl ClientState {
    /// Classifies an address: configuration first, traffic inference second.
    #[must_use]
    pub fn device_type(&self, address: &DeviceAddress) -> DeviceType {
        if let Some(configured) = self.config.configured_type(address) {
            return configured;
        }
        infer_device_type(&self.packets, address)
    }

    /// Returns the last known packet for an address, if any.
    #[inline]
    #[must_use]
    pub fn last_state(&self, address: &DeviceAddress) -> Option<&RfPacket> {
        self.states.get(address)
    }
}

// ============================================================================
// Store
// ============================================================================

struct Shared {
    state: RwLock<ClientState>,
    revision: watch::Sender<u64>,
}

/// Cloneable handle to the shared client state.
///
/// Mutations are atomic from a reader's perspective; each bumps a revision
/// counter observable through [`Store::subscribe`].
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(ClientState::default()),
                revision,
            }),
        }
    }

    /// Acquires a read guard on the current state.
    ///
    /// Hold it briefly; mutations block while a guard is live.
    #[must_use]
    pub fn read(&self) -> RwLockReadGuard<'_, ClientState> {
        self.shared.state.read()
    }

    /// Subscribes to change notification.
    ///
    /// The receiver's value is a revision counter; `changed().await` wakes
    /// after any mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Returns the current revision counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Returns the connection flag without holding a guard.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.state.read().connected
    }

    fn mutate(&self, f: impl FnOnce(&mut ClientState)) {
        {
            let mut state = self.shared.state.write();
            f(&mut state);
        }
        self.shared.revision.send_modify(|revision| *revision += 1);
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Updates the connection flag.
    ///
    /// Accumulated history is intentionally left untouched across
    /// reconnects.
    pub fn set_connected(&self, connected: bool) {
        self.mutate(|state| state.connected = connected);
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Replaces the configured-device snapshot wholesale.
    pub fn apply_config(&self, config: DeviceConfig) {
        self.mutate(|state| {
            state.freq = config.freq;
            state.config = config;
        });
    }

    /// Applies a full state snapshot in one transaction.
    ///
    /// Used on (re)connect and heartbeats so the client can resynchronize
    /// from scratch without accumulating drift.
    pub fn apply_state_snapshot(&self, snapshot: StateSnapshot) {
        self.mutate(|state| {
            state.device_name = snapshot.device;
            state.uptime_ms = snapshot.uptime_ms;
            state.scanning = snapshot.scanning;
            state.log_capture = snapshot.log_capture;
            state.dump_active = snapshot.dump_active;
            state.freq = snapshot.freq;
            state.covers = snapshot.covers;
            state.discovered = snapshot.discovered;
        });
    }

    /// Replaces only the cover list.
    pub fn apply_covers(&self, covers: Vec<CoverStatus>) {
        self.mutate(|state| state.covers = covers);
    }

    /// Replaces only the discovered list.
    pub fn apply_discovered(&self, discovered: Vec<DiscoveredDevice>) {
        self.mutate(|state| state.discovered = discovered);
    }

    /// Replaces the raw packet dump snapshot.
    pub fn apply_packet_dump(&self, dump: PacketDump) {
        self.mutate(|state| {
            state.dump_active = dump.dump_active;
            state.dump_packets = dump.packets;
        });
    }

    /// Updates the scanning flag.
    pub fn set_scanning(&self, scanning: bool) {
        self.mutate(|state| state.scanning = scanning);
    }

    // ========================================================================
    // Telemetry and Logs
    // ========================================================================

    /// Records one observed RF packet.
    ///
    /// Appends to the history buffer and overwrites the last-known entry
    /// for the packet's source address. Last write wins; partial fields are
    /// never merged.
    pub fn record_packet(&self, packet: RfPacket) {
        self.mutate(|state| {
            state.states.insert(packet.src.clone(), packet.clone());
            state.packets.push(packet);
        });
    }

    /// Appends a batch of log entries in the order received.
    pub fn record_logs(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        self.mutate(|state| {
            for entry in entries {
                state.logs.push(entry);
            }
        });
    }

    /// Empties the packet history and the last-known-state map.
    pub fn clear_packets(&self) {
        self.mutate(|state| {
            state.packets.clear();
            state.states.clear();
        });
    }

    /// Empties the log history.
    pub fn clear_logs(&self) {
        self.mutate(|state| state.logs.clear());
    }

    // ========================================================================
    // UI Selection
    // ========================================================================

    /// Sets the active tab.
    pub fn set_active_tab(&self, tab: ActiveTab) {
        self.mutate(|state| state.active_tab = tab);
    }

    /// Sets the device list layout.
    pub fn set_view_mode(&self, mode: ViewMode) {
        self.mutate(|state| state.view_mode = mode);
    }

    /// Sets the configured/discovered filter.
    pub fn set_device_filter(&self, filter: DeviceFilter) {
        self.mutate(|state| state.device_filter = filter);
    }

    /// Sets the blind/light filter.
    pub fn set_device_type_filter(&self, filter: DeviceTypeFilter) {
        self.mutate(|state| state.device_type_filter = filter);
    }

    /// Sets the free-text packet address filter.
    pub fn set_rf_filter(&self, filter: impl Into<String>) {
        self.mutate(|state| state.rf_filter = filter.into());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{BlindConfig, PacketType, StateCode};

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
            rssi: Some(-70.0),
            ch: Some(3),
            hop: None,
            raw: None,
        }
    }

    fn cover(addr_s: &str, name: &str) -> CoverStatus {
        CoverStatus {
            blind_address: addr(addr_s),
            name: name.into(),
            channel: 1,
            remote_address: addr("0xff0001"),
            open_duration_ms: 25_000,
            close_duration_ms: 22_000,
            poll_interval_ms: 300_000,
            payload_1: None,
            payload_2: None,
            pck_inf1: None,
            pck_inf2: None,
            hop: None,
            state: None,
            state_time: None,
        }
    }

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            device: "elero-bridge".into(),
            uptime_ms: 120_000,
            scanning: false,
            log_capture: false,
            dump_active: false,
            freq: FrequencyRegisters::new(0x21, 0x71, 0x7a),
            covers: vec![cover("0x0000aa", "Kitchen"), cover("0x0000bb", "Bedroom")],
            discovered: vec![DiscoveredDevice {
                blind_address: addr("0x0000cc"),
                channel: 4,
                remote_address: addr("0xff0002"),
                payload_1: None,
                payload_2: None,
                pck_inf1: None,
                pck_inf2: None,
                hop: None,
                already_configured: false,
                already_adopted: false,
            }],
        }
    }

    #[test]
    fn test_set_connected_preserves_history() {
        let store = Store::new();
        store.record_packet(status_packet("0x0000aa", StateCode::TOP));

        store.set_connected(true);
        store.set_connected(false);

        let state = store.read();
        assert_eq!(state.packets.len(), 1);
        assert!(state.last_state(&addr("0x0000aa")).is_some());
    }

    #[test]
    fn test_full_snapshot_then_incremental_covers() {
        let store = Store::new();
        store.apply_state_snapshot(snapshot());

        store.apply_covers(vec![cover("0x0000dd", "Office")]);

        let state = store.read();
        // Only the cover list changed.
        assert_eq!(state.covers.len(), 1);
        assert_eq!(state.covers[0].name, "Office");
        // Name, frequency, and discovered list are untouched.
        assert_eq!(state.device_name, "elero-bridge");
        assert_eq!(state.freq, FrequencyRegisters::new(0x21, 0x71, 0x7a));
        assert_eq!(state.discovered.len(), 1);
    }

    #[test]
    fn test_incremental_discovered_leaves_covers() {
        let store = Store::new();
        store.apply_state_snapshot(snapshot());

        store.apply_discovered(Vec::new());

        let state = store.read();
        assert!(state.discovered.is_empty());
        assert_eq!(state.covers.len(), 2);
    }

    #[test]
    fn test_record_packet_last_write_wins() {
        let store = Store::new();
        store.record_packet(status_packet("0x0000aa", StateCode::TOP));
        store.record_packet(status_packet("0x0000bb", StateCode::BOTTOM));
        store.record_packet(status_packet("0x0000aa", StateCode::MOVING_UP));

        let state = store.read();
        assert_eq!(
            state.last_state(&addr("0x0000aa")).and_then(|p| p.state),
            Some(StateCode::MOVING_UP)
        );
        // Other addresses are unaffected.
        assert_eq!(
            state.last_state(&addr("0x0000bb")).and_then(|p| p.state),
            Some(StateCode::BOTTOM)
        );
        assert_eq!(state.packets.len(), 3);
    }

    #[test]
    fn test_clear_packets_also_clears_state_map() {
        let store = Store::new();
        store.record_packet(status_packet("0x0000aa", StateCode::TOP));

        store.clear_packets();

        let state = store.read();
        assert!(state.packets.is_empty());
        assert!(state.states.is_empty());
    }

    #[test]
    fn test_record_logs_in_order() {
        let store = Store::new();
        store.record_logs(vec![
            LogEntry {
                t: 1,
                level: 3,
                tag: "elero".into(),
                msg: "first".into(),
            },
            LogEntry {
                t: 2,
                level: 1,
                tag: "elero".into(),
                msg: "second".into(),
            },
        ]);

        let state = store.read();
        let msgs: Vec<&str> = state.logs.iter().map(|e| e.msg.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }

    #[test]
    fn test_device_type_prefers_configuration() {
        let store = Store::new();
        store.apply_config(DeviceConfig {
            device: "bridge".into(),
            blinds: vec![BlindConfig {
                address: addr("0x0000aa"),
                name: "Kitchen".into(),
                channel: 1,
                remote: addr("0xff0001"),
                open_ms: 25_000,
                close_ms: 22_000,
                poll_ms: 300_000,
                tilt: false,
            }],
            lights: Vec::new(),
            freq: FrequencyRegisters::default(),
        });
        // Traffic alone would classify this address as a light.
        store.record_packet(status_packet("0x0000aa", StateCode::ON));

        {
            let state = store.read();
            assert_eq!(state.device_type(&addr("0x0000aa")), DeviceType::Blind);
        }
        // Unconfigured addresses fall back to inference.
        store.record_packet(status_packet("0x0000ee", StateCode::ON));
        let state = store.read();
        assert_eq!(state.device_type(&addr("0x0000ee")), DeviceType::Light);
    }

    #[test]
    fn test_revision_bumps_on_mutation() {
        let store = Store::new();
        let before = store.revision();
        store.set_scanning(true);
        assert_eq!(store.revision(), before + 1);
    }

    #[tokio::test]
    async fn test_subscribe_wakes_on_mutation() {
        let store = Store::new();
        let mut rx = store.subscribe();
        store.set_active_tab(ActiveTab::Logs);
        rx.changed().await.expect("sender alive");
        assert_eq!(store.read().active_tab, ActiveTab::Logs);
    }
}
