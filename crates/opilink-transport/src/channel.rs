use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::{Result, TransportError};

/// Connectivity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Everything a channel reports upward, in arrival order.
#[derive(Debug)]
pub enum ChannelEvent {
    /// One complete inbound OPI message.
    Message(String),
    /// The connection state changed.
    ConnectionChanged(ConnectionState),
    /// A transport failure that the channel absorbed.
    Error(TransportError),
}

pub type EventSink = mpsc::UnboundedSender<ChannelEvent>;
pub type EventStream = mpsc::UnboundedReceiver<ChannelEvent>;

/// Create the event pipe a channel reports into.
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Timeouts and limits shared by both topologies.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound for a single connect attempt (client topology).
    pub connect_timeout: Duration,
    /// Upper bound for a single message write.
    pub write_timeout: Duration,
    /// Pause between reconnect attempts (client topology).
    pub reconnect_delay: Duration,
    /// Largest accepted frame payload (server topology).
    pub max_payload_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
            max_payload_size: opilink_frame::DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// One physical link to a terminal, whichever side dials.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Connect (or start listening). Suspends until that completes.
    async fn open(&self) -> Result<()>;

    /// Tear everything down and stop any reconnection. Safe in any state.
    async fn close(&self);

    /// Transmit one message. Failures are reported as [`ChannelEvent::Error`].
    async fn send(&self, text: &str);

    fn state(&self) -> ConnectionState;

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// Whether the channel re-opens itself after an unexpected closure.
    fn auto_reconnect(&self) -> bool;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
