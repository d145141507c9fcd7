//! Client topology: the POS dials the terminal over a WebSocket.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, ChannelConfig, ChannelEvent, ConnectionState, EventSink};
use crate::endpoint::TerminalEndpoint;
use crate::error::{Result, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Dial-out channel. One WebSocket text message carries one OPI message.
///
/// After a successful [`open`](Channel::open) the channel keeps itself
/// connected: an unexpected closure publishes `Disconnected` and the same
/// endpoint is re-dialled every `reconnect_delay` until [`close`](Channel::close).
pub struct ClientChannel {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: TerminalEndpoint,
    config: ChannelConfig,
    events: EventSink,
    state: watch::Sender<ConnectionState>,
    writer: Mutex<Option<WsWriter>>,
    armed: StdMutex<Option<CancellationToken>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ClientChannel {
    pub fn new(endpoint: TerminalEndpoint, config: ChannelConfig, events: EventSink) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                events,
                state,
                writer: Mutex::new(None),
                armed: StdMutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn endpoint(&self) -> &TerminalEndpoint {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }
}

#[async_trait]
impl Channel for ClientChannel {
    async fn open(&self) -> Result<()> {
        if self.inner.is_armed() && self.state() == ConnectionState::Connected {
            return Ok(());
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.inner.arm(token.clone()) {
            previous.cancel();
        }
        if let Some(stale) = self.inner.supervisor.lock().await.take() {
            stale.abort();
        }

        self.inner.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            _ = token.cancelled() => Err(TransportError::Shutdown),
            connected = self.inner.connect() => connected,
        };
        let reader = match connected {
            Ok(reader) => reader,
            Err(err) => {
                self.inner.disarm(&token);
                self.inner.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        info!(url = %self.inner.endpoint.websocket_url(), "connected to terminal");
        self.inner.set_state(ConnectionState::Connected);
        let task = tokio::spawn(supervise(Arc::clone(&self.inner), reader, token));
        *self.inner.supervisor.lock().await = Some(task);
        Ok(())
    }

    async fn close(&self) {
        if let Some(token) = self.inner.take_armed() {
            token.cancel();
        }
        if let Some(task) = self.inner.supervisor.lock().await.take() {
            if let Err(err) = task.await {
                debug!(error = %err, "supervisor task ended abnormally");
            }
        }
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let goodbye = tokio::time::timeout(
                self.inner.config.write_timeout,
                writer.send(Message::Close(None)),
            )
            .await;
            if !matches!(goodbye, Ok(Ok(()))) {
                debug!("close frame not delivered");
            }
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    async fn send(&self, text: &str) {
        let mut guard = self.inner.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            debug!("dropping outbound message: not connected");
            self.inner.emit(ChannelEvent::Error(TransportError::NotConnected));
            return;
        };

        let timeout = self.inner.config.write_timeout;
        match tokio::time::timeout(timeout, writer.send(Message::text(text.to_owned()))).await {
            Ok(Ok(())) => trace!(len = text.len(), "outbound message written"),
            Ok(Err(err)) => {
                warn!(error = %err, "websocket write failed");
                self.inner.emit(ChannelEvent::Error(err.into()));
            }
            Err(_) => {
                warn!(?timeout, "websocket write timed out");
                self.inner
                    .emit(ChannelEvent::Error(TransportError::WriteTimeout(timeout)));
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    fn auto_reconnect(&self) -> bool {
        true
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        if let Some(token) = self.inner.take_armed() {
            token.cancel();
        }
    }
}

impl Inner {
    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            trace!("channel event dropped: no receiver");
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "connection state changed");
            self.emit(ChannelEvent::ConnectionChanged(next));
        }
    }

    fn arm(&self, token: CancellationToken) -> Option<CancellationToken> {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token)
    }

    /// Forget `token` unless a newer `open` or a `close` already replaced it.
    fn disarm(&self, token: &CancellationToken) {
        if !token.is_cancelled() {
            self.take_armed();
        }
    }

    fn take_armed(&self) -> Option<CancellationToken> {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Dial once, bounded by `connect_timeout`, and install the write half.
    async fn connect(&self) -> Result<WsReader> {
        let url = self.endpoint.websocket_url();
        let attempt =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str())).await;
        let (stream, _response) = match attempt {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                return Err(TransportError::Connect {
                    url,
                    reason: err.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::Connect {
                    url,
                    reason: format!("timed out after {:?}", self.config.connect_timeout),
                })
            }
        };
        let (writer, reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        Ok(reader)
    }

    /// Forward inbound messages until the connection ends.
    async fn pump(&self, reader: &mut WsReader) -> Result<()> {
        while let Some(message) = reader.next().await {
            match message? {
                Message::Text(text) => {
                    trace!(len = text.len(), "inbound message");
                    self.emit(ChannelEvent::Message(text.as_str().to_owned()));
                }
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.emit(ChannelEvent::Message(text.to_owned())),
                    Err(err) => warn!(error = %err, "discarding non-UTF-8 binary message"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "terminal sent close frame");
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Re-dial every `reconnect_delay` until connected or cancelled.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<WsReader> {
        let mut attempt: u64 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
            attempt += 1;
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => return None,
                connected = self.connect() => connected,
            };
            match connected {
                Ok(reader) => {
                    info!(attempt, url = %self.endpoint.websocket_url(), "reconnected to terminal");
                    return Some(reader);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "reconnect attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }
}

async fn supervise(inner: Arc<Inner>, mut reader: WsReader, cancel: CancellationToken) {
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = inner.pump(&mut reader) => outcome,
        };

        inner.writer.lock().await.take();
        inner.set_state(ConnectionState::Disconnected);
        match outcome {
            Ok(()) => info!("terminal closed the connection"),
            Err(err) => {
                warn!(error = %err, "connection to terminal lost");
                inner.emit(ChannelEvent::Error(err));
            }
        }

        reader = match inner.reconnect(&cancel).await {
            Some(reader) => reader,
            None => return,
        };
        inner.set_state(ConnectionState::Connected);
    }
}
