use opilink_transport::TransportError;

/// Why an engine entry point refused to start (or could not finish) a call.
///
/// Outcomes of accepted operations are never reported here; they are
/// published as [`OperationStatus`](crate::OperationStatus) values.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Another operation is still pending.
    #[error("an operation is already in progress")]
    OperationInProgress,

    /// The channel is not connected to a terminal.
    #[error("terminal not connected")]
    NotInitialised,

    /// `abort` was called with nothing to abort.
    #[error("no operation pending")]
    NoOperationPending,

    /// The amount cannot be expressed on the wire.
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    /// The currency is not a three-letter ISO-4217 code.
    #[error("invalid currency code {0:?}")]
    InvalidCurrency(String),

    /// The request could not be serialized.
    #[error("failed to build request: {0}")]
    DataHandling(#[from] opilink_message::MessageError),

    /// Opening the channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The engine task is gone.
    #[error("engine closed")]
    EngineClosed,
}

pub type Result<T> = std::result::Result<T, RequestError>;
