use std::time::Duration;

/// Errors that can occur in OPI transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind a listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the terminal.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol or stream failure on the client topology.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Framing failure on the server topology.
    #[error("frame error: {0}")]
    Frame(#[from] opilink_frame::FrameError),

    /// A message was sent while no connection was open; it was dropped.
    #[error("not connected; message dropped")]
    NotConnected,

    /// A write did not complete in time.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The remote side closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The channel was closed while the operation was in flight.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
