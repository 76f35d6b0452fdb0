//! Bridge client: public command API over the connection supervisor.
//!
//! [`BridgeClient`] is a cheap, cloneable handle. Construction spawns a
//! single supervisor task (see [`connection`]) that owns the WebSocket and
//! the reconnect timer; every handle talks to it over an unbounded command
//! channel.
//!
//! # Connection Lifecycle
//!
//! ```text
//! disconnected ──connect()──► connecting ──handshake──► open
//!      ▲                          │                       │
//!      │◄───────disconnect()──────┴──◄─close (auto-retry)─┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rfbridge_client::{BridgeClient, CoverAction, Endpoint, Store};
//!
//! # async fn example() -> rfbridge_client::Result<()> {
//! let store = Store::new();
//! let client = BridgeClient::new(Endpoint::new("bridge.local", false)?, store.clone());
//! client.connect();
//!
//! // Observe state changes.
//! let mut changes = store.subscribe();
//! changes.changed().await.ok();
//!
//! // Fire a device action and a correlated request.
//! let address = "0x1a2b3c".parse()?;
//! client.cover_command(&address, CoverAction::Up)?;
//! client.scan_start().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Connection supervisor and event loop.
pub(crate) mod connection;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};
use crate::freq::FrequencyRegisters;
use crate::identifiers::DeviceAddress;
use crate::protocol::{
    ClientMessage, CoverAction, Outbound, RawTransmit, Request, RequestCommand,
};
use crate::store::Store;

use connection::{ConnectionCommand, CorrelationMap, ResponsePayload, Supervisor};

pub use connection::RECONNECT_DELAY;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for correlated commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum pending correlated requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Well-known WebSocket path on the bridge.
pub const ENDPOINT_PATH: &str = "/elero/ws";

// ============================================================================
// Endpoint
// ============================================================================

/// Bridge WebSocket endpoint.
///
/// The path is fixed; only the host and the TLS choice vary. The scheme
/// mirrors the hosting page's: plain HTTP pages use `ws`, HTTPS uses `wss`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Builds the endpoint for a bridge host (`host` or `host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the host does not form a valid
    /// URL.
    pub fn new(host: &str, tls: bool) -> Result<Self> {
        let scheme = if tls { "wss" } else { "ws" };
        let url = Url::parse(&format!("{scheme}://{host}{ENDPOINT_PATH}"))
            .map_err(|e| Error::invalid_argument(format!("invalid bridge host {host:?}: {e}")))?;
        Ok(Self { url })
    }

    /// Uses an explicit URL, e.g. for tests against a local mock bridge.
    #[inline]
    #[must_use]
    pub const fn from_url(url: Url) -> Self {
        Self { url }
    }

    /// Returns the full WebSocket URL.
    #[inline]
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

// ============================================================================
// BridgeClient
// ============================================================================

/// Handle to the bridge connection.
///
/// Cloning shares the underlying supervisor task. The task exits when
/// [`BridgeClient::shutdown`] is called or every handle is dropped.
pub struct BridgeClient {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    correlation: Arc<Mutex<CorrelationMap>>,
    store: Store,
}

impl Clone for BridgeClient {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            store: self.store.clone(),
        }
    }
}

impl BridgeClient {
    /// Creates the client and spawns its supervisor task.
    ///
    /// The client starts disconnected; call [`BridgeClient::connect`] to
    /// open the transport.
    #[must_use]
    pub fn new(endpoint: Endpoint, store: Store) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation: Arc<Mutex<CorrelationMap>> = Arc::new(Mutex::new(CorrelationMap::default()));

        let supervisor = Supervisor::new(
            endpoint.url.clone(),
            store.clone(),
            Arc::clone(&correlation),
            command_rx,
        );
        tokio::spawn(supervisor.run());

        Self {
            command_tx,
            correlation,
            store,
        }
    }

    /// Returns the shared state store.
    #[inline]
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Returns the number of in-flight correlated requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Opens the transport. No-op while already connecting or open.
    ///
    /// Also re-enables auto-reconnect after an explicit
    /// [`BridgeClient::disconnect`].
    pub fn connect(&self) {
        self.send_command(ConnectionCommand::Connect);
    }

    /// Closes the transport, cancels any scheduled reconnect, and
    /// suppresses auto-reconnect until the next [`BridgeClient::connect`].
    pub fn disconnect(&self) {
        self.send_command(ConnectionCommand::Disconnect);
    }

    /// Tears down the supervisor task entirely.
    pub fn shutdown(&self) {
        self.send_command(ConnectionCommand::Shutdown);
    }

    fn send_command(&self, command: ConnectionCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("connection supervisor is gone");
        }
    }

    // ========================================================================
    // Fire-and-Forget Commands
    // ========================================================================

    /// Sends an imperative device action (`up`/`down`/`stop`/`tilt`/`on`/`off`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the transport is not open.
    pub fn cover_command(&self, address: &DeviceAddress, action: CoverAction) -> Result<()> {
        self.fire(ClientMessage::Cmd {
            address: address.clone(),
            action,
        })
    }

    /// Transmits a raw debug packet.
    ///
    /// The [`RawTransmit`] constructor has already validated the input
    /// structurally; nothing malformed reaches the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the transport is not open.
    pub fn send_raw(&self, raw: RawTransmit) -> Result<()> {
        self.fire(ClientMessage::Raw(raw))
    }

    fn fire(&self, message: ClientMessage) -> Result<()> {
        if !self.store.is_connected() {
            return Err(Error::NotConnected);
        }
        self.command_tx
            .send(ConnectionCommand::Fire(Outbound::Message(message)))
            .map_err(|_| Error::ConnectionClosed)
    }

    // ========================================================================
    // Correlated Commands
    // ========================================================================

    /// Starts the discovery scan.
    pub async fn scan_start(&self) -> Result<()> {
        self.ack_command(RequestCommand::ScanStart).await
    }

    /// Stops the discovery scan.
    pub async fn scan_stop(&self) -> Result<()> {
        self.ack_command(RequestCommand::ScanStop).await
    }

    /// Adopts a discovered device under the given name.
    pub async fn adopt(&self, address: &DeviceAddress, name: impl Into<String>) -> Result<()> {
        self.ack_command(RequestCommand::Adopt {
            address: address.clone(),
            name: name.into(),
        })
        .await
    }

    /// Updates a cover's timing settings.
    pub async fn save_settings(
        &self,
        address: &DeviceAddress,
        open_duration_ms: u32,
        close_duration_ms: u32,
        poll_interval_ms: u32,
    ) -> Result<()> {
        self.ack_command(RequestCommand::Settings {
            address: address.clone(),
            open_duration_ms,
            close_duration_ms,
            poll_interval_ms,
        })
        .await
    }

    /// Exports the bridge configuration as YAML.
    pub async fn get_yaml(&self) -> Result<String> {
        match self
            .send_correlated(RequestCommand::GetYaml, DEFAULT_COMMAND_TIMEOUT)
            .await?
        {
            ResponsePayload::Yaml(yaml) => Ok(yaml),
            ResponsePayload::Ack => Err(Error::protocol("expected yaml payload")),
        }
    }

    /// Starts log capture.
    pub async fn log_start(&self) -> Result<()> {
        self.ack_command(RequestCommand::LogStart).await
    }

    /// Stops log capture.
    pub async fn log_stop(&self) -> Result<()> {
        self.ack_command(RequestCommand::LogStop).await
    }

    /// Clears the captured log on the bridge and locally.
    pub async fn log_clear(&self) -> Result<()> {
        self.ack_command(RequestCommand::LogClear).await?;
        self.store.clear_logs();
        Ok(())
    }

    /// Programs the radio frequency registers.
    pub async fn set_frequency(&self, registers: FrequencyRegisters) -> Result<()> {
        self.ack_command(RequestCommand::SetFrequency(registers))
            .await
    }

    /// Starts the raw packet dump.
    pub async fn dump_start(&self) -> Result<()> {
        self.ack_command(RequestCommand::DumpStart).await
    }

    /// Stops the raw packet dump.
    pub async fn dump_stop(&self) -> Result<()> {
        self.ack_command(RequestCommand::DumpStop).await
    }

    /// Clears the captured dump.
    pub async fn dump_clear(&self) -> Result<()> {
        self.ack_command(RequestCommand::DumpClear).await
    }

    async fn ack_command(&self, command: RequestCommand) -> Result<()> {
        match self
            .send_correlated(command, DEFAULT_COMMAND_TIMEOUT)
            .await?
        {
            ResponsePayload::Ack => Ok(()),
            ResponsePayload::Yaml(_) => Err(Error::protocol("unexpected yaml payload")),
        }
    }

    /// Sends a correlated request and waits for its response.
    ///
    /// Exactly one of three outcomes occurs per request: the bridge's
    /// acknowledgement, the bridge's error reason, or a timeout. Fails fast
    /// with [`Error::NotConnected`] before allocating an id when the
    /// transport is not open.
    pub(crate) async fn send_correlated(
        &self,
        command: RequestCommand,
        request_timeout: Duration,
    ) -> Result<ResponsePayload> {
        if !self.store.is_connected() {
            return Err(Error::NotConnected);
        }

        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let request = Request::new(command);
        let request_id = request.id;

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout: the entry must not resolve later.
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_schemes() {
        let plain = Endpoint::new("bridge.local", false).expect("endpoint");
        assert_eq!(plain.url().as_str(), "ws://bridge.local/elero/ws");

        let tls = Endpoint::new("bridge.local:8443", true).expect("endpoint");
        assert_eq!(tls.url().as_str(), "wss://bridge.local:8443/elero/ws");
    }

    #[test]
    fn test_endpoint_rejects_bad_host() {
        assert!(Endpoint::new("not a host", false).is_err());
    }

    #[tokio::test]
    async fn test_commands_fail_fast_when_disconnected() {
        let store = Store::new();
        let client = BridgeClient::new(
            Endpoint::new("127.0.0.1:9", false).expect("endpoint"),
            store,
        );

        // No connect() was issued; everything rejects synchronously.
        let address: DeviceAddress = "0xaabbcc".parse().expect("address");
        assert!(matches!(
            client.cover_command(&address, CoverAction::Up),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            client.scan_start().await,
            Err(Error::NotConnected)
        ));
        assert_eq!(client.pending_count(), 0);
    }
}
