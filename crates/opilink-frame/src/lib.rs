//! Length-prefixed framing for OPI messages on the server-topology socket.
//!
//! Every message on the wire is:
//! - A 4-byte big-endian payload length
//! - That many bytes of UTF-8 XML text
//!
//! No partial reads, no buffer management in user code. The client topology
//! does not use this crate: its transport already delivers whole messages.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::OpiFrameCodec;
