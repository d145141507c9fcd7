//! Socket channels between the POS and an OPI card terminal.
//!
//! Two topologies share one capability contract, [`Channel`]:
//! - [`ClientChannel`]: the POS dials the terminal; one WebSocket text
//!   message per OPI message; unbounded automatic reconnection.
//! - [`ServerChannel`]: the terminal dials the POS; every accepted
//!   connection speaks length-prefixed frames; sends are broadcast.
//!
//! Transport failures never escape a channel as errors. They are reported
//! as [`ChannelEvent::Error`] on the event stream handed to the channel.

pub mod channel;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod server;

pub use channel::{
    event_channel, Channel, ChannelConfig, ChannelEvent, ConnectionState, EventSink, EventStream,
};
pub use client::ClientChannel;
pub use endpoint::TerminalEndpoint;
pub use error::{Result, TransportError};
pub use server::ServerChannel;
