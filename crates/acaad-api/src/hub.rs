//! Push-event hub connection with auto-reconnect.
//!
//! Each ACAAD server exposes a SignalR hub at `ws(s)://address:push_port/events`.
//! A [`HubConnection`] owns one background task per host that connects
//! (negotiation skipped, JSON protocol), forwards `receiveEvent`
//! invocations into the engine's event queue and reconnects on a fixed
//! interval for as long as it runs.
//!
//! Signaling events are enqueued around each session:
//! [`AcaadEvent::ServerConnected`] once the handshake succeeds and
//! [`AcaadEvent::ServerDisconnected`] when the session ends for any reason.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use acaad_api::{Host, hub::{HubConfig, HubConnection}, events::JsonEventFactory};
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let hub = HubConnection::start(
//!     Host::new("garage", "10.0.0.5", 5000),
//!     Arc::new(JsonEventFactory),
//!     tx,
//!     HubConfig::default(),
//!     CancellationToken::new(),
//! );
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{}", event.name());
//! }
//!
//! hub.stop().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::events::{AcaadEvent, EventFactory};
use crate::host::Host;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── SignalR JSON protocol ────────────────────────────────────────────

const RECORD_SEPARATOR: char = '\u{1e}';
const RECEIVE_EVENT_METHOD: &str = "receiveEvent";

const INVOCATION: u64 = 1;
const PING: u64 = 6;
const CLOSE: u64 = 7;

// ── HubState ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Disconnected,
    Connecting,
    Connected,
}

// ── HubConfig ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Fixed delay between connection attempts. Default: 5s.
    pub reconnect_interval: Duration,
    /// Interval of outgoing SignalR pings while connected. Default: 15s.
    pub keepalive_interval: Duration,
    /// Upper bound for the handshake response. Default: 15s.
    pub handshake_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(15),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

// ── HubConnection ────────────────────────────────────────────────────

/// Handle to a host's background hub task.
pub struct HubConnection {
    host: Host,
    state_rx: watch::Receiver<HubState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HubConnection {
    /// Spawn the reconnect-and-listen loop. The first attempt happens
    /// immediately in the background; this call never blocks on the network.
    pub fn start(
        host: Host,
        factory: Arc<dyn EventFactory>,
        queue: mpsc::UnboundedSender<AcaadEvent>,
        config: HubConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(HubState::Disconnected);

        let session = Session {
            host: host.clone(),
            factory,
            queue,
            config,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(hub_loop(session));

        debug!(host = %host.friendly_name, "Hub connection created");

        Self {
            host,
            state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn state(&self) -> HubState {
        *self.state_rx.borrow()
    }

    /// Stop the loop, close an open socket and wait for the task to end.
    ///
    /// Safe to call repeatedly and without an active connection.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(host = %self.host.friendly_name, error = %e, "Hub task ended abnormally");
            }
            info!(host = %self.host.friendly_name, "Hub connection stopped");
        }
    }
}

// ── Background reconnect loop ────────────────────────────────────────

struct Session {
    host: Host,
    factory: Arc<dyn EventFactory>,
    queue: mpsc::UnboundedSender<AcaadEvent>,
    config: HubConfig,
    state: watch::Sender<HubState>,
    cancel: CancellationToken,
}

impl Session {
    fn enqueue(&self, event: AcaadEvent) {
        let name = event.name();
        if self.queue.send(event).is_err() {
            debug!(host = %self.host.friendly_name, event = name, "Event queue closed, dropping event");
        }
    }
}

/// Tick at a fixed interval; attempt a session whenever disconnected.
async fn hub_loop(session: Session) {
    let mut ticker = tokio::time::interval(session.config.reconnect_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = session.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if *session.state.borrow() != HubState::Disconnected {
            continue;
        }

        trace!(host = %session.host.friendly_name, "Attempting hub connection");
        session.state.send_replace(HubState::Connecting);

        match connect_and_listen(&session).await {
            Ok(()) => {
                debug!(host = %session.host.friendly_name, "Hub session ended");
            }
            Err(e) if e.is_unreachable() => {
                debug!(host = %session.host.friendly_name, error = %e, "Hub server unreachable");
            }
            Err(e) => {
                warn!(host = %session.host.friendly_name, error = %e, "Hub connection error");
            }
        }

        session.state.send_replace(HubState::Disconnected);
    }

    debug!(host = %session.host.friendly_name, "Hub loop exiting");
}

// ── Single session lifecycle ─────────────────────────────────────────

async fn connect_and_listen(session: &Session) -> Result<(), Error> {
    let (ws, pending) = tokio::select! {
        biased;
        () = session.cancel.cancelled() => return Ok(()),
        ws = connect(session) => ws?,
    };

    session.state.send_replace(HubState::Connected);
    info!(host = %session.host.friendly_name, "Hub connected");
    session.enqueue(AcaadEvent::ServerConnected(session.host.clone()));

    let result = match handle_records(session, &pending) {
        Ok(RecordOutcome::Continue) => listen(session, ws).await,
        Ok(RecordOutcome::Close) => Ok(()),
        Err(e) => Err(e),
    };

    session.enqueue(AcaadEvent::ServerDisconnected(session.host.clone()));
    result
}

/// Open the socket and perform the SignalR handshake.
///
/// Returns the stream plus any records that arrived in the same frame as
/// the handshake response. Refused connections, rejected upgrades and
/// rejected handshakes are reported as [`Error::ServerUnreachable`].
async fn connect(session: &Session) -> Result<(WsStream, String), Error> {
    let url = session.host.push_url()?;
    debug!(url = %url, "Connecting to hub");

    let (mut ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| classify_connect_error(url.as_str(), e))?;

    ws.send(Message::text(handshake_request()))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let first = tokio::time::timeout(session.config.handshake_timeout, next_text(&mut ws))
        .await
        .map_err(|_| Error::Handshake("timed out waiting for handshake response".into()))??;

    let (handshake, pending) = first
        .split_once(RECORD_SEPARATOR)
        .unwrap_or((first.as_str(), ""));
    check_handshake(url.as_str(), handshake.trim())?;

    Ok((ws, pending.to_owned()))
}

fn classify_connect_error(url: &str, e: tungstenite::Error) -> Error {
    match e {
        tungstenite::Error::Io(io) => Error::ServerUnreachable {
            url: url.to_owned(),
            reason: io.to_string(),
        },
        tungstenite::Error::Http(resp) => Error::ServerUnreachable {
            url: url.to_owned(),
            reason: format!("upgrade rejected with HTTP {}", resp.status()),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

/// Read frames until the first text frame.
async fn next_text(ws: &mut WsStream) -> Result<String, Error> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(Error::Handshake("connection closed during handshake".into()));
            }
            Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
            Some(Ok(_)) => {}
        }
    }
}

/// Read until the session ends. Sends a ping record every keepalive tick.
async fn listen(session: &Session, ws: WsStream) -> Result<(), Error> {
    let (mut write, mut read) = ws.split();

    let mut keepalive = tokio::time::interval(session.config.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;

    loop {
        tokio::select! {
            biased;
            () = session.cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                return Ok(());
            }
            _ = keepalive.tick() => {
                write
                    .send(Message::text(ping_record()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if handle_records(session, text.as_str())? == RecordOutcome::Close {
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return match frame {
                            Some(cf) if cf.code != CloseCode::Normal => {
                                Err(Error::WebSocketClosed {
                                    code: cf.code.into(),
                                    reason: cf.reason.as_str().to_owned(),
                                })
                            }
                            _ => {
                                info!(host = %session.host.friendly_name, "Hub close frame received");
                                Ok(())
                            }
                        };
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        info!(host = %session.host.friendly_name, "Hub stream ended");
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings
                    }
                }
            }
        }
    }
}

// ── Record handling ──────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum RecordOutcome {
    Continue,
    Close,
}

fn handshake_request() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({ "protocol": "json", "version": 1 }))
}

fn ping_record() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({ "type": PING }))
}

fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|r| !r.is_empty())
}

/// The handshake response is `{}` on success or `{"error": "..."}`.
fn check_handshake(url: &str, record: &str) -> Result<(), Error> {
    let value: Value = serde_json::from_str(record)
        .map_err(|e| Error::Handshake(format!("malformed handshake response: {e}")))?;

    match value.get("error").and_then(Value::as_str) {
        Some(reason) => Err(Error::ServerUnreachable {
            url: url.to_owned(),
            reason: format!("handshake rejected: {reason}"),
        }),
        None => Ok(()),
    }
}

fn handle_records(session: &Session, text: &str) -> Result<RecordOutcome, Error> {
    for record in split_records(text) {
        if handle_record(session, record)? == RecordOutcome::Close {
            return Ok(RecordOutcome::Close);
        }
    }
    Ok(RecordOutcome::Continue)
}

fn handle_record(session: &Session, record: &str) -> Result<RecordOutcome, Error> {
    let value: Value = match serde_json::from_str(record) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Ignoring malformed hub record");
            return Ok(RecordOutcome::Continue);
        }
    };

    match value.get("type").and_then(Value::as_u64) {
        Some(INVOCATION) => {
            for event in decode_invocation(&session.host, session.factory.as_ref(), &value) {
                trace!(host = %session.host.friendly_name, event = event.name(), "Hub event received");
                session.enqueue(event);
            }
            Ok(RecordOutcome::Continue)
        }
        Some(PING) => Ok(RecordOutcome::Continue),
        Some(CLOSE) => match value.get("error").and_then(Value::as_str) {
            Some(reason) => Err(Error::WebSocketClosed {
                code: 1000,
                reason: reason.to_owned(),
            }),
            None => Ok(RecordOutcome::Close),
        },
        other => {
            trace!(record_type = ?other, "Ignoring hub record");
            Ok(RecordOutcome::Continue)
        }
    }
}

/// Turn an invocation record into events. Only `receiveEvent` targets
/// (case-insensitive) produce events; every argument is one payload.
fn decode_invocation(host: &Host, factory: &dyn EventFactory, record: &Value) -> Vec<AcaadEvent> {
    let target = record.get("target").and_then(Value::as_str).unwrap_or_default();
    if !target.eq_ignore_ascii_case(RECEIVE_EVENT_METHOD) {
        trace!(target, "Ignoring invocation for unknown target");
        return Vec::new();
    }

    record
        .get("arguments")
        .and_then(Value::as_array)
        .map(|args| {
            args.iter()
                .map(|payload| match factory.create_event(payload) {
                    Some(decoded) => AcaadEvent::from_payload(host.clone(), decoded),
                    None => AcaadEvent::UnhandledEventReceived {
                        host: host.clone(),
                        payload: payload.clone(),
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────────────
