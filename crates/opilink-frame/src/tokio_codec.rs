//! `tokio_util::codec` adapter for async sockets.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{decode_frame, encode_frame, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Frames OPI messages for `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone)]
pub struct OpiFrameCodec {
    max_payload_size: usize,
}

impl OpiFrameCodec {
    /// Codec with the default 16 MiB payload cap.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for OpiFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OpiFrameCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        decode_frame(src, self.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(text) = self.decode(src)? {
            return Ok(Some(text));
        }
        if !src.is_empty() {
            debug!(
                buffered = src.len(),
                "stream closed mid-frame; dropping partial frame"
            );
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<&str> for OpiFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(item, dst)
    }
}

impl Encoder<String> for OpiFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&str>::encode(self, item.as_str(), dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, OpiFrameCodec::new());
        let mut stream = FramedRead::new(server, OpiFrameCodec::new());

        let writer = tokio::spawn(async move {
            sink.send("<ServiceRequest RequestID=\"1\"/>".to_string())
                .await
                .unwrap();
            sink.send("x".repeat(300)).await.unwrap();
        });

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            "<ServiceRequest RequestID=\"1\"/>"
        );
        assert_eq!(stream.next().await.unwrap().unwrap(), "x".repeat(300));
        writer.await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn partial_trailing_frame_is_end_of_stream() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = FramedRead::new(server, OpiFrameCodec::new());

        client.write_all(&[0, 0, 0, 9, b'a', b'b']).await.unwrap();
        drop(client);

        assert!(stream.next().await.is_none());
    }

    #[test]
    fn oversized_frame_rejected_on_encode() {
        let mut codec = OpiFrameCodec::with_max_payload(3);
        let mut dst = BytesMut::new();
        let err = codec.encode("toolong", &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 7, max: 3 }));
        assert!(dst.is_empty());
    }
}
