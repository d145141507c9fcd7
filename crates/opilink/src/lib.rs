//! POS to card terminal integration over the Open Payment Initiative protocol.
//!
//! # Crate Structure
//!
//! - [`frame`]: length-prefixed framing used by the server topology
//! - [`message`]: the OPI XML vocabulary and its codec
//! - [`transport`]: the `Channel` seam with client (WebSocket) and server (TCP) topologies
//! - [`engine`]: one-at-a-time operation correlation and status publication

/// Re-export frame types.
pub mod frame {
    pub use opilink_frame::*;
}

/// Re-export message types.
pub mod message {
    pub use opilink_message::*;
}

/// Re-export transport types.
pub mod transport {
    pub use opilink_transport::*;
}

/// Re-export engine types.
pub mod engine {
    pub use opilink_engine::*;
}

pub use opilink_engine::{EngineConfig, OperationStatus, OpiEngine, RequestError};
pub use opilink_transport::{ChannelConfig, TerminalEndpoint};
