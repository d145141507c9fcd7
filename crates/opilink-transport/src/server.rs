//! Server topology: the terminal dials the POS; frames are length-prefixed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use opilink_frame::OpiFrameCodec;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::{Channel, ChannelConfig, ChannelEvent, ConnectionState, EventSink};
use crate::endpoint::TerminalEndpoint;
use crate::error::{Result, TransportError};

/// Listening channel. Every accepted connection is a peer; sends go to all.
pub struct ServerChannel {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: TerminalEndpoint,
    config: ChannelConfig,
    events: EventSink,
    state: watch::Sender<ConnectionState>,
    peers: StdMutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    local_addrs: StdMutex<Vec<SocketAddr>>,
    next_peer_id: AtomicU64,
    session: Mutex<Option<Session>>,
}

struct Session {
    cancel: CancellationToken,
    listeners: JoinSet<()>,
}

impl ServerChannel {
    pub fn new(endpoint: TerminalEndpoint, config: ChannelConfig, events: EventSink) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                events,
                state,
                peers: StdMutex::new(HashMap::new()),
                local_addrs: StdMutex::new(Vec::new()),
                next_peer_id: AtomicU64::new(1),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn endpoint(&self) -> &TerminalEndpoint {
        &self.inner.endpoint
    }

    /// Addresses actually bound, in port order. Empty while closed.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.inner
            .local_addrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers().len()
    }
}

#[async_trait]
impl Channel for ServerChannel {
    async fn open(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let mut bound = Vec::new();
        for port in self.inner.endpoint.ports() {
            let addr = self.inner.endpoint.authority(port);
            let listener = TcpListener::bind((self.inner.endpoint.host.as_str(), port))
                .await
                .map_err(|source| TransportError::Bind {
                    addr: addr.clone(),
                    source,
                })?;
            let local = listener.local_addr()?;
            info!(%local, port, "listening for terminal connections");
            bound.push((listener, local));
        }

        let cancel = CancellationToken::new();
        let mut listeners = JoinSet::new();
        let mut addrs = Vec::with_capacity(bound.len());
        for (listener, local) in bound {
            addrs.push(local);
            listeners.spawn(accept_loop(
                Arc::clone(&self.inner),
                listener,
                local,
                cancel.clone(),
            ));
        }
        *self
            .inner
            .local_addrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = addrs;

        *session = Some(Session { cancel, listeners });
        self.inner.refresh_state(true);
        Ok(())
    }

    async fn close(&self) {
        let Some(mut session) = self.inner.session.lock().await.take() else {
            self.inner.refresh_state(false);
            return;
        };
        session.cancel.cancel();
        while let Some(joined) = session.listeners.join_next().await {
            if let Err(err) = joined {
                debug!(error = %err, "listener task ended abnormally");
            }
        }
        self.inner
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .local_addrs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.refresh_state(false);
        info!("stopped listening");
    }

    async fn send(&self, text: &str) {
        let peers = self.inner.peers();
        if peers.is_empty() {
            debug!("no terminal connected; outbound message dropped");
            return;
        }
        for (peer, outbound) in peers {
            if outbound.send(text.to_owned()).is_err() {
                trace!(peer, "peer went away before the message was queued");
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
        false
    }
}

impl Drop for ServerChannel {
    fn drop(&mut self) {
        if let Ok(mut session) = self.inner.session.try_lock() {
            if let Some(session) = session.take() {
                session.cancel.cancel();
            }
        }
    }
}

impl Inner {
    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            trace!("channel event dropped: no receiver");
        }
    }

    fn peers(&self) -> Vec<(u64, mpsc::UnboundedSender<String>)> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, outbound)| (*id, outbound.clone()))
            .collect()
    }

    /// Derive the state from listening status and peer count.
    fn refresh_state(&self, listening: bool) {
        let next = if !listening {
            ConnectionState::Disconnected
        } else if self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
        {
            ConnectionState::Connecting
        } else {
            ConnectionState::Connected
        };
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
}

async fn accept_loop(
    inner: Arc<Inner>,
    listener: TcpListener,
    local: SocketAddr,
    cancel: CancellationToken,
) {
    let mut peers = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let id = inner.next_peer_id.fetch_add(1, Ordering::Relaxed);
                    info!(peer = id, %remote, port = local.port(), "terminal connected");
                    peers.spawn(serve_peer(Arc::clone(&inner), id, stream, cancel.clone()));
                }
                Err(err) => {
                    warn!(error = %err, port = local.port(), "accept failed");
                    inner.emit(ChannelEvent::Error(TransportError::Accept(err)));
                }
            },
            Some(joined) = peers.join_next(), if !peers.is_empty() => {
                if let Err(err) = joined {
                    debug!(error = %err, "peer task ended abnormally");
                }
            }
        }
    }
    while peers.join_next().await.is_some() {}
    debug!(port = local.port(), "listener stopped");
}

async fn serve_peer(inner: Arc<Inner>, id: u64, stream: TcpStream, cancel: CancellationToken) {
    let max = inner.config.max_payload_size;
    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, OpiFrameCodec::with_max_payload(max));
    let mut sink = FramedWrite::new(write_half, OpiFrameCodec::with_max_payload(max));
    let (outbound, mut queued) = mpsc::unbounded_channel::<String>();

    inner
        .peers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, outbound);
    inner.refresh_state(true);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => match frame {
                Some(Ok(text)) => {
                    trace!(peer = id, len = text.len(), "inbound frame");
                    inner.emit(ChannelEvent::Message(text));
                }
                Some(Err(err)) => {
                    warn!(peer = id, error = %err, "dropping peer after read failure");
                    inner.emit(ChannelEvent::Error(err.into()));
                    break;
                }
                None => {
                    info!(peer = id, "terminal disconnected");
                    break;
                }
            },
            Some(text) = queued.recv() => {
                let timeout = inner.config.write_timeout;
                match tokio::time::timeout(timeout, sink.send(text)).await {
                    Ok(Ok(())) => trace!(peer = id, "outbound frame written"),
                    Ok(Err(err)) => {
                        warn!(peer = id, error = %err, "dropping peer after write failure");
                        inner.emit(ChannelEvent::Error(err.into()));
                        break;
                    }
                    Err(_) => {
                        warn!(peer = id, ?timeout, "dropping peer after write timeout");
                        inner.emit(ChannelEvent::Error(TransportError::WriteTimeout(timeout)));
                        break;
                    }
                }
            }
        }
    }

    inner
        .peers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    if !cancel.is_cancelled() {
        inner.refresh_state(true);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::codec::Framed;

    use super::*;
    use crate::channel::{event_channel, EventStream};

    type Terminal = Framed<TcpStream, OpiFrameCodec>;

    async fn dial(addr: SocketAddr) -> Terminal {
        let stream = TcpStream::connect(addr)
            .await
            .expect("terminal should connect");
        Framed::new(stream, OpiFrameCodec::new())
    }

    async fn next_message(events: &mut EventStream) -> String {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("event should arrive in time")
                .expect("event stream should stay open");
            if let ChannelEvent::Message(text) = event {
                return text;
            }
        }
    }

    async fn wait_for_state(channel: &ServerChannel, wanted: ConnectionState) {
        let mut states = channel.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == wanted))
            .await
            .expect("state should change in time")
            .expect("state sender should be alive");
    }

    async fn recv_frame(terminal: &mut Terminal) -> String {
        tokio::time::timeout(Duration::from_secs(5), terminal.next())
            .await
            .expect("frame should arrive in time")
            .expect("terminal stream should stay open")
            .expect("frame should decode")
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .expect("free port should be available")
    }

    fn loopback() -> TerminalEndpoint {
        TerminalEndpoint::new("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn peer_exchanges_frames() {
        let (sink, mut events) = event_channel();
        let channel = ServerChannel::new(loopback(), ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        assert_eq!(channel.state(), ConnectionState::Connecting);

        let mut terminal = dial(channel.local_addrs()[0]).await;
        wait_for_state(&channel, ConnectionState::Connected).await;

        terminal
            .send("<DeviceRequest/>")
            .await
            .expect("terminal should send");
        assert_eq!(next_message(&mut events).await, "<DeviceRequest/>");

        channel.send("<DeviceResponse/>").await;
        assert_eq!(recv_frame(&mut terminal).await, "<DeviceResponse/>");

        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn send_broadcasts_to_every_peer() {
        let (sink, _events) = event_channel();
        let channel = ServerChannel::new(loopback(), ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        let addr = channel.local_addrs()[0];

        let mut first = dial(addr).await;
        let mut second = dial(addr).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while channel.peer_count() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both peers should register");

        channel.send("<ServiceRequest/>").await;
        assert_eq!(recv_frame(&mut first).await, "<ServiceRequest/>");
        assert_eq!(recv_frame(&mut second).await, "<ServiceRequest/>");

        channel.close().await;
    }

    #[tokio::test]
    async fn peer_disconnect_leaves_listener_running() {
        let (sink, mut events) = event_channel();
        let channel = ServerChannel::new(loopback(), ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        let addr = channel.local_addrs()[0];

        let terminal = dial(addr).await;
        wait_for_state(&channel, ConnectionState::Connected).await;
        drop(terminal);
        wait_for_state(&channel, ConnectionState::Connecting).await;

        let mut again = dial(addr).await;
        wait_for_state(&channel, ConnectionState::Connected).await;
        again
            .send("<CardServiceResponse/>")
            .await
            .expect("terminal should send");
        assert_eq!(next_message(&mut events).await, "<CardServiceResponse/>");

        channel.close().await;
    }

    #[tokio::test]
    async fn secondary_port_feeds_same_stream() {
        let (primary, secondary) = (free_port(), free_port());
        let endpoint = TerminalEndpoint::new("127.0.0.1", primary).with_secondary_port(secondary);

        let (sink, mut events) = event_channel();
        let channel = ServerChannel::new(endpoint, ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        assert_eq!(channel.local_addrs().len(), 2);

        let mut on_primary = dial(channel.local_addrs()[0]).await;
        let mut on_secondary = dial(channel.local_addrs()[1]).await;
        on_secondary
            .send("<DeviceRequest RequestID=\"7\"/>")
            .await
            .expect("secondary should send");
        assert_eq!(
            next_message(&mut events).await,
            "<DeviceRequest RequestID=\"7\"/>"
        );
        on_primary
            .send("<ServiceResponse/>")
            .await
            .expect("primary should send");
        assert_eq!(next_message(&mut events).await, "<ServiceResponse/>");

        channel.close().await;
    }

    #[tokio::test]
    async fn send_without_peers_is_noop() {
        let (sink, mut events) = event_channel();
        let channel = ServerChannel::new(loopback(), ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        // Drain the Connecting transition.
        while events.try_recv().is_ok() {}

        channel.send("<ServiceRequest/>").await;
        assert!(events.try_recv().is_err());

        channel.close().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("probe should bind");
        let port = taken.local_addr().expect("probe has address").port();

        let (sink, _events) = event_channel();
        let channel = ServerChannel::new(
            TerminalEndpoint::new("127.0.0.1", port),
            ChannelConfig::default(),
            sink,
        );
        let err = channel.open().await.expect_err("bind should fail");
        assert!(matches!(err, TransportError::Bind { .. }), "{err}");
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_releases_listeners() {
        let (sink, _events) = event_channel();
        let channel = ServerChannel::new(loopback(), ChannelConfig::default(), sink);
        channel.open().await.expect("channel should open");
        let addr = channel.local_addrs()[0];
        let _terminal = dial(addr).await;
        wait_for_state(&channel, ConnectionState::Connected).await;

        channel.close().await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(channel.peer_count(), 0);
        assert!(channel.local_addrs().is_empty());
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
