//! Real-time channel client using tokio-tungstenite

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use agileflow_protocol::{ClientEvent, ServerEvent};

use super::core::BackoffState;
use super::shared::{parse_server_frame, ParsedServerFrame};
use crate::config::ReconnectPolicy;
use crate::error::SyncError;
use crate::ports::{ConnectionState, RealtimePort};

/// Everything the transport reports to the session layer, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    Event(ServerEvent),
}

#[derive(Debug)]
enum Outgoing {
    Event(ClientEvent),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Intentional,
    Unexpected,
}

/// WebSocket client for the room broadcast channel.
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    url: Arc<str>,
    policy: ReconnectPolicy,
    state: Arc<AtomicU8>,
    tx: Arc<Mutex<Option<mpsc::Sender<Outgoing>>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Set by `disconnect()` so a close is never followed by a reconnect
    intentional_disconnect: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl RealtimeClient {
    /// Create a client and the receiver its transport events are delivered on.
    ///
    /// Nothing connects until [`RealtimeClient::connect`] is called.
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let client = Self {
            url: Arc::from(url.into().into_boxed_str()),
            policy,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
            tx: Arc::new(Mutex::new(None)),
            events,
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        };
        (client, events_rx)
    }

    /// Start the connection loop in the background.
    ///
    /// Returns `None` if a loop is already running. After the reconnection
    /// budget is exhausted the loop ends in `Failed`; calling `connect` again
    /// starts a fresh budget.
    pub fn connect(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Real-time connection loop already running");
            return None;
        }
        self.intentional_disconnect.store(false, Ordering::SeqCst);

        let client = self.clone();
        Some(tokio::spawn(async move {
            client.run().await;
            client.running.store(false, Ordering::SeqCst);
        }))
    }

    fn outgoing(&self) -> MutexGuard<'_, Option<mpsc::Sender<Outgoing>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_intentional(&self) -> bool {
        self.intentional_disconnect.load(Ordering::SeqCst)
    }

    fn set_state(&self, new_state: ConnectionState) {
        let previous = self.state.swap(new_state.to_u8(), Ordering::SeqCst);
        if previous != new_state.to_u8() {
            let _ = self.events.send(TransportEvent::StateChanged(new_state));
        }
    }

    async fn run(&self) {
        let mut backoff = BackoffState::new(self.policy);

        loop {
            if self.is_intentional() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            match self.connect_once().await {
                Ok(SessionEnd::Intentional) => {
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
                Ok(SessionEnd::Unexpected) => {
                    tracing::info!("Connection closed unexpectedly, initiating reconnection");
                    backoff.reset();
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = backoff.attempts(),
                        error = %e,
                        "Failed to connect to real-time server"
                    );
                }
            }

            if self.is_intentional() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            self.set_state(ConnectionState::Reconnecting);
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!("Max reconnection attempts reached, giving up");
                self.set_state(ConnectionState::Failed);
                return;
            };
            tracing::info!(
                attempt = backoff.attempts(),
                max_attempts = backoff.max_attempts(),
                delay_ms = delay,
                "Reconnecting to real-time server"
            );

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                _ = self.shutdown.notified() => {
                    tracing::info!("Reconnection cancelled - intentional disconnect");
                }
            }
        }
    }

    /// One connection from handshake to close.
    async fn connect_once(&self) -> Result<SessionEnd, tokio_tungstenite::tungstenite::Error> {
        self.set_state(ConnectionState::Connecting);

        let ws_stream = tokio::select! {
            result = connect_async(self.url.as_ref()) => result?.0,
            _ = self.shutdown.notified() => {
                tracing::info!("Handshake abandoned - intentional disconnect");
                return Ok(SessionEnd::Intentional);
            }
        };
        tracing::info!(url = %self.url, "Connected to real-time server");

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Outgoing>(32);
        *self.outgoing() = Some(tx);

        // disconnect() may have run during the handshake, before there was a
        // sender to close. Checked after installing it so the two cannot miss
        // each other.
        if self.is_intentional() {
            self.outgoing().take();
            let _ = write.send(Message::Close(None)).await;
            tracing::info!("Closing fresh connection - intentional disconnect");
            return Ok(SessionEnd::Intentional);
        }
        self.set_state(ConnectionState::Connected);

        let mut write_handle = tokio::spawn(async move {
            while let Some(outgoing) = rx.recv().await {
                match outgoing {
                    Outgoing::Event(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!(event = event.name(), error = %e, "Failed to serialize event");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json)).await {
                            tracing::error!(error = %e, "Failed to send event");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let events = self.events.clone();
        let mut read_handle = tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => match parse_server_frame(&text) {
                        Ok(ParsedServerFrame::Event(event)) => {
                            let _ = events.send(TransportEvent::Event(event));
                        }
                        Ok(ParsedServerFrame::Unknown { event }) => {
                            tracing::debug!(event = %event, "Ignoring unknown server event");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to parse server frame");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("Server closed connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        });

        tokio::select! {
            _ = &mut read_handle => {}
            _ = &mut write_handle => {}
        }
        read_handle.abort();
        write_handle.abort();

        *self.outgoing() = None;
        self.set_state(ConnectionState::Disconnected);

        Ok(if self.is_intentional() {
            SessionEnd::Intentional
        } else {
            SessionEnd::Unexpected
        })
    }
}

impl RealtimePort for RealtimeClient {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn emit(&self, event: ClientEvent) -> Result<(), SyncError> {
        // Clone the sender so the lock is not held while queueing
        let tx = self.outgoing().clone();
        let Some(tx) = tx else {
            return Err(SyncError::NotConnected);
        };
        tx.try_send(Outgoing::Event(event))
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    fn disconnect(&self) {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        // Wake only a loop that is waiting right now; a stored permit would cut
        // short the first backoff of a later connect()
        self.shutdown.notify_waiters();

        let tx = self.outgoing().take();
        if let Some(tx) = tx {
            let _ = tx.try_send(Outgoing::Close);
        }
        if !self.running.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
        }
    }
}
