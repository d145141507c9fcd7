/// Errors raised while converting between OPI messages and XML text.
///
/// Decode errors keep the offending text so callers can surface it.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The text is not well-formed XML or does not match the message layout.
    #[error("malformed OPI message: {reason}")]
    Malformed { reason: String, raw: String },

    /// The root element is not an OPI message kind.
    #[error("unknown OPI message element <{element}>")]
    UnknownKind { element: String, raw: String },

    /// The root element names a different kind than the caller expected.
    #[error("expected {expected} but received {actual}")]
    UnexpectedKind {
        expected: crate::MessageKind,
        actual: crate::MessageKind,
        raw: String,
    },

    /// A message could not be rendered as XML.
    #[error("failed to serialize {kind}: {reason}")]
    Serialize {
        kind: crate::MessageKind,
        reason: String,
    },
}

impl MessageError {
    /// The raw wire text that failed to decode, if this is a decode error.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Malformed { raw, .. }
            | Self::UnknownKind { raw, .. }
            | Self::UnexpectedKind { raw, .. } => Some(raw),
            Self::Serialize { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MessageError>;
