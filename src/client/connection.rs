//! Connection supervisor and event loop.
//!
//! One task owns the WebSocket for the lifetime of the client. It cycles
//! through three states:
//!
//! - **idle** — explicitly disconnected; only a `Connect` command leaves it
//! - **connecting** — a dial attempt is in flight
//! - **open** — frames are dispatched and commands transmitted
//!
//! A lost transport (close, network error) schedules exactly one reconnect
//! attempt after a fixed delay; an explicit `Disconnect` cancels that timer
//! and parks the supervisor in idle until the next `Connect`. Because the
//! socket and the delay both live in this single task, there can never be
//! two live sockets or two pending reconnect timers.
//!
//! Request/response correlation lives here too: pending requests are keyed
//! by id in a shared map, resolved by the first matching `result`/`yaml`
//! frame, and failed wholesale when the session ends.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Outbound, Request, ServerMessage};
use crate::store::Store;

// ============================================================================
// Constants
// ============================================================================

/// Fixed delay before an automatic reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Bound on waiting for the peer to finish the close handshake.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Map of request ids to response channels.
pub(crate) type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<ResponsePayload>>>;

/// Successful payload of a correlated response.
#[derive(Debug)]
pub(crate) enum ResponsePayload {
    /// Plain acknowledgement.
    Ack,
    /// YAML export text.
    Yaml(String),
}

/// Commands from the client handle to the supervisor task.
pub(crate) enum ConnectionCommand {
    /// Send a correlated request and route its response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<ResponsePayload>>,
    },
    /// Transmit a fire-and-forget message.
    Fire(Outbound),
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Open the transport (no-op while connecting or open).
    Connect,
    /// Close the transport and suppress auto-reconnect.
    Disconnect,
    /// Tear down the supervisor entirely.
    Shutdown,
}

/// Why a session or wait ended.
enum SessionEnd {
    /// Transport lost; schedule one reconnect.
    Lost,
    /// Explicit disconnect; park in idle.
    Disconnected,
    /// Supervisor should exit.
    Shutdown,
}

// ============================================================================
// Supervisor
// ============================================================================

/// The task that owns transport lifecycle, dispatch, and correlation.
pub(crate) struct Supervisor {
    endpoint: Url,
    store: Store,
    correlation: Arc<Mutex<CorrelationMap>>,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl Supervisor {
    pub(crate) fn new(
        endpoint: Url,
        store: Store,
        correlation: Arc<Mutex<CorrelationMap>>,
        command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            endpoint,
            store,
            correlation,
            command_rx,
        }
    }

    /// Runs until shutdown or until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        // Starts idle; the first `Connect` command begins dialing.
        let mut want_connection = false;

        loop {
            if !want_connection {
                match self.wait_idle().await {
                    SessionEnd::Lost => want_connection = true,
                    SessionEnd::Disconnected => {}
                    SessionEnd::Shutdown => break,
                }
                continue;
            }

            match self.connect_once().await {
                ConnectOutcome::Open(ws) => {
                    debug!(endpoint = %self.endpoint, "connected to bridge");
                    self.store.set_connected(true);
                    let end = self.run_session(ws).await;
                    self.store.set_connected(false);
                    self.fail_pending();

                    match end {
                        SessionEnd::Lost => match self.sleep_before_reconnect().await {
                            SessionEnd::Lost => {}
                            SessionEnd::Disconnected => want_connection = false,
                            SessionEnd::Shutdown => break,
                        },
                        SessionEnd::Disconnected => want_connection = false,
                        SessionEnd::Shutdown => break,
                    }
                }

                ConnectOutcome::Failed => match self.sleep_before_reconnect().await {
                    SessionEnd::Lost => {}
                    SessionEnd::Disconnected => want_connection = false,
                    SessionEnd::Shutdown => break,
                },

                ConnectOutcome::Cancelled => want_connection = false,

                ConnectOutcome::Shutdown => break,
            }
        }

        self.fail_pending();
        debug!("connection supervisor terminated");
    }

    // ========================================================================
    // Idle / Connecting / Waiting
    // ========================================================================

    /// Parks until a `Connect` command arrives.
    ///
    /// Returns `Lost` (repurposed as "start connecting") on `Connect`.
    async fn wait_idle(&mut self) -> SessionEnd {
        loop {
            match self.command_rx.recv().await {
                Some(ConnectionCommand::Connect) => return SessionEnd::Lost,
                Some(ConnectionCommand::Disconnect) => {}
                Some(ConnectionCommand::Shutdown) | None => return SessionEnd::Shutdown,
                Some(command) => self.reject_offline(command),
            }
        }
    }

    /// Dials the endpoint while staying responsive to commands.
    async fn connect_once(&mut self) -> ConnectOutcome {
        let connect = connect_async(self.endpoint.as_str());
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok((ws, _)) => ConnectOutcome::Open(ws),
                        Err(e) => {
                            warn!(error = %e, endpoint = %self.endpoint, "connection attempt failed");
                            ConnectOutcome::Failed
                        }
                    };
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Connect) => {} // already connecting
                        Some(ConnectionCommand::Disconnect) => return ConnectOutcome::Cancelled,
                        Some(ConnectionCommand::Shutdown) | None => return ConnectOutcome::Shutdown,
                        Some(command) => self.reject_offline(command),
                    }
                }
            }
        }
    }

    /// Waits out the fixed reconnect delay.
    ///
    /// `Lost` means the delay elapsed and a retry should begin. A
    /// `Disconnect` command cancels the pending attempt; a `Connect`
    /// command retries immediately.
    async fn sleep_before_reconnect(&mut self) -> SessionEnd {
        debug!(delay_ms = RECONNECT_DELAY.as_millis() as u64, "scheduling reconnect");
        let sleep = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return SessionEnd::Lost,

                command = self.command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Connect) => return SessionEnd::Lost,
                        Some(ConnectionCommand::Disconnect) => return SessionEnd::Disconnected,
                        Some(ConnectionCommand::Shutdown) | None => return SessionEnd::Shutdown,
                        Some(command) => self.reject_offline(command),
                    }
                }
            }
        }
    }

    /// Fails fast any command that needs an open transport.
    fn reject_offline(&self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Send { response_tx, .. } => {
                let _ = response_tx.send(Err(Error::NotConnected));
            }
            ConnectionCommand::Fire(_) => {
                debug!("dropping outbound message while disconnected");
            }
            ConnectionCommand::RemoveCorrelation(request_id) => {
                self.correlation.lock().remove(&request_id);
            }
            // Lifecycle commands are matched by the state loops before this
            // helper runs.
            ConnectionCommand::Connect
            | ConnectionCommand::Disconnect
            | ConnectionCommand::Shutdown => {}
        }
    }

    // ========================================================================
    // Open Session
    // ========================================================================

    /// Pumps one open WebSocket session until it ends.
    async fn run_session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(text.as_str());
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by bridge");
                            return SessionEnd::Lost;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            return SessionEnd::Lost;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return SessionEnd::Lost;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            self.transmit_request(request, response_tx, &mut ws_write).await;
                        }

                        Some(ConnectionCommand::Fire(outbound)) => {
                            if let Ok(json) = to_string(&outbound)
                                && let Err(e) = ws_write.send(Message::Text(json.into())).await
                            {
                                warn!(error = %e, "failed to transmit message");
                                return SessionEnd::Lost;
                            }
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            self.correlation.lock().remove(&request_id);
                            debug!(%request_id, "removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Connect) => {} // already open

                        Some(ConnectionCommand::Disconnect) => {
                            let _ = ws_write.close().await;
                            // A peer that never acknowledges the close must
                            // not wedge the supervisor.
                            let _ = timeout(CLOSE_DRAIN_TIMEOUT, drain(&mut ws_read)).await;
                            return SessionEnd::Disconnected;
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            let _ = ws_write.close().await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Serializes and transmits a correlated request.
    async fn transmit_request(
        &self,
        request: Request,
        response_tx: oneshot::Sender<Result<ResponsePayload>>,
        ws_write: &mut WsSink,
    ) {
        let request_id = request.id;

        let json = match to_string(&Outbound::Request(request)) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Register before sending so a fast response always finds its entry.
        self.correlation.lock().insert(request_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await
            && let Some(tx) = self.correlation.lock().remove(&request_id)
        {
            let _ = tx.send(Err(Error::connection(e.to_string())));
            return;
        }

        trace!(%request_id, "request sent");
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Routes one inbound frame to the store or the correlation map.
    ///
    /// Unparsable frames are logged and dropped; a malformed frame must
    /// never crash the client or desynchronize state.
    fn dispatch(&self, text: &str) {
        let message = match from_str::<ServerMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "dropping unparsable frame");
                return;
            }
        };

        match message {
            ServerMessage::Config(config) => self.store.apply_config(config),
            ServerMessage::State(snapshot) => self.store.apply_state_snapshot(snapshot),
            ServerMessage::Covers(covers) => self.store.apply_covers(covers),
            ServerMessage::Discovered(discovered) => self.store.apply_discovered(discovered),
            ServerMessage::Rf(packet) => self.store.record_packet(packet),
            ServerMessage::Log(entries) => self.store.record_logs(entries),
            ServerMessage::Packets(dump) => self.store.apply_packet_dump(dump),
            ServerMessage::ScanStatus(status) => self.store.set_scanning(status.scanning),

            ServerMessage::Result(ack) => {
                let outcome = if ack.success {
                    Ok(ResponsePayload::Ack)
                } else {
                    Err(Error::command(
                        ack.error.unwrap_or_else(|| "command failed".to_string()),
                    ))
                };
                self.resolve(ack.id, outcome);
            }

            ServerMessage::Yaml(payload) => {
                self.resolve(payload.id, Ok(ResponsePayload::Yaml(payload.yaml)));
            }
        }
    }

    /// Resolves one pending request; the entry is removed first, so each
    /// id fires at most once.
    fn resolve(&self, request_id: RequestId, outcome: Result<ResponsePayload>) {
        let tx = self.correlation.lock().remove(&request_id);
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        } else {
            warn!(%request_id, "response for unknown request");
        }
    }

    /// Fails all pending requests with `ConnectionClosed`.
    fn fail_pending(&self) {
        let pending: Vec<_> = self.correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "failed pending requests");
        }
    }
}

/// Consumes remaining frames after a close so the handshake completes.
async fn drain(ws_read: &mut WsSource) {
    while let Some(frame) = ws_read.next().await {
        if frame.is_err() {
            break;
        }
    }
}

// ============================================================================
// ConnectOutcome
// ============================================================================

enum ConnectOutcome {
    /// Handshake completed.
    Open(WsStream),
    /// Dial failed; retry after the delay.
    Failed,
    /// Explicit disconnect while connecting.
    Cancelled,
    /// Supervisor should exit.
    Shutdown,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;
    use std::sync::Once;

    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tracing_subscriber::EnvFilter;

    use crate::client::{BridgeClient, Endpoint};
    use crate::protocol::{CoverAction, RequestCommand};

    type MockStream = WebSocketStream<TcpStream>;

    fn init_logging() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("rfbridge_client=debug"))
                .with_target(false)
                .with_test_writer()
                .init();
        });
    }

    async fn mock_bridge() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/elero/ws")).expect("url");
        (listener, Endpoint::from_url(url))
    }

    async fn accept_client(listener: &TcpListener) -> MockStream {
        let (stream, _) = listener.accept().await.expect("accept should succeed");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    async fn wait_connected(store: &Store, connected: bool) {
        let mut changes = store.subscribe();
        while store.is_connected() != connected {
            changes.changed().await.expect("store should stay alive");
        }
    }

    async fn recv_json(ws: &mut MockStream) -> Value {
        loop {
            let frame = ws.next().await.expect("frame").expect("frame ok");
            if let Message::Text(text) = frame {
                return from_str(text.as_str()).expect("valid json");
            }
        }
    }

    async fn send_json(ws: &mut MockStream, value: &Value) {
        let text = value.to_string();
        ws.send(Message::Text(text.into()))
            .await
            .expect("send should succeed");
    }

    #[tokio::test]
    async fn test_correlated_request_resolves() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        let mut ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        let bridge = tokio::spawn(async move {
            let request = recv_json(&mut ws).await;
            assert_eq!(request["type"], "scan_start");
            let id = request["id"].clone();
            send_json(
                &mut ws,
                &json!({ "event": "result", "data": { "id": id, "success": true } }),
            )
            .await;
            ws
        });

        client.scan_start().await.expect("scan should succeed");
        assert_eq!(client.pending_count(), 0);

        drop(bridge.await.expect("bridge task"));
        client.shutdown();
    }

    #[tokio::test]
    async fn test_correlated_request_surfaces_bridge_error() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        let mut ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        let bridge = tokio::spawn(async move {
            let request = recv_json(&mut ws).await;
            let id = request["id"].clone();
            send_json(
                &mut ws,
                &json!({
                    "event": "result",
                    "data": { "id": id, "success": false, "error": "unknown address" }
                }),
            )
            .await;
            ws
        });

        let err = client
            .adopt(&"0xaabbcc".parse().expect("address"), "kitchen")
            .await
            .expect_err("bridge rejected the command");
        assert!(matches!(err, Error::Command { .. }));
        assert!(err.to_string().contains("unknown address"));

        drop(bridge.await.expect("bridge task"));
        client.shutdown();
    }

    #[tokio::test]
    async fn test_correlated_request_times_out_and_cleans_up() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        // Accept but never answer.
        let ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        let err = client
            .send_correlated(RequestCommand::ScanStart, Duration::from_millis(100))
            .await
            .expect_err("no response was sent");
        assert!(err.is_timeout());

        // The supervisor removes the entry once it processes the
        // cancellation; give it a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.pending_count(), 0);

        drop(ws);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_unsolicited_frames_update_store() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        let mut ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        let mut changes = store.subscribe();
        changes.mark_unchanged();

        send_json(
            &mut ws,
            &json!({
                "event": "state",
                "data": { "device": "elero-bridge", "uptime_ms": 1234, "scanning": true }
            }),
        )
        .await;
        send_json(
            &mut ws,
            &json!({
                "event": "rf",
                "data": {
                    "t": 10, "src": "0x112233", "dst": "0xaabbcc",
                    "type": "0x6a", "state": "0x01", "rssi": -61.5
                }
            }),
        )
        .await;
        send_json(
            &mut ws,
            &json!({ "event": "log", "data": [{ "t": 11, "level": 3, "tag": "elero", "msg": "tick" }] }),
        )
        .await;

        // A malformed frame in between must be dropped without effect.
        ws.send(Message::Text("{not json".into()))
            .await
            .expect("send should succeed");

        loop {
            changes.changed().await.expect("store should stay alive");
            let state = store.read();
            if state.packets.len() == 1 && state.logs.len() == 1 {
                break;
            }
        }

        let state = store.read();
        assert_eq!(state.device_name, "elero-bridge");
        assert!(state.scanning);
        let src: crate::identifiers::DeviceAddress = "0x112233".parse().expect("address");
        assert!(state.states.contains_key(&src));
        drop(state);

        client.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_transport_loss() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        let mut ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        ws.close(None).await.expect("close should succeed");
        drop(ws);
        wait_connected(&store, false).await;

        // One automatic retry after the fixed delay.
        let _ws = timeout(RECONNECT_DELAY + Duration::from_secs(3), accept_client(&listener))
            .await
            .expect("client should redial");
        wait_connected(&store, true).await;

        client.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_completes_against_unresponsive_peer() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        // The peer completes the handshake, then goes silent: it neither
        // reads nor acknowledges the close frame.
        let ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        client.disconnect();

        timeout(Duration::from_secs(3), wait_connected(&store, false))
            .await
            .expect("disconnect must complete despite a silent peer");

        // The supervisor is still responsive afterwards.
        let address = "0xaabbcc".parse().expect("address");
        assert!(matches!(
            client.cover_command(&address, CoverAction::Stop),
            Err(Error::NotConnected)
        ));

        drop(ws);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_disconnect_cancels_reconnect() {
        init_logging();
        let (listener, endpoint) = mock_bridge().await;
        let store = Store::new();
        let client = BridgeClient::new(endpoint, store.clone());
        client.connect();

        let mut ws = accept_client(&listener).await;
        wait_connected(&store, true).await;

        ws.close(None).await.expect("close should succeed");
        drop(ws);
        wait_connected(&store, false).await;

        client.disconnect();

        // No redial while parked in idle.
        let redial = timeout(RECONNECT_DELAY + Duration::from_secs(1), listener.accept()).await;
        assert!(redial.is_err(), "disconnect must cancel the pending retry");

        let address = "0xaabbcc".parse().expect("address");
        assert!(matches!(
            client.cover_command(&address, CoverAction::Stop),
            Err(Error::NotConnected)
        ));

        client.shutdown();
    }
}
