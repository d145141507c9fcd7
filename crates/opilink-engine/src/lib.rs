//! Operation correlation for OPI card terminals.
//!
//! [`OpiEngine`] accepts one terminal operation at a time (login, payment,
//! refund, reversal, reconciliation), sends it over a transport channel and
//! publishes [`OperationStatus`] values as the terminal answers:
//!
//! ```no_run
//! # async fn run() -> Result<(), opilink_engine::RequestError> {
//! use opilink_engine::{EngineConfig, OpiEngine};
//! use opilink_transport::{ChannelConfig, TerminalEndpoint};
//!
//! let engine = OpiEngine::client(
//!     TerminalEndpoint::new("192.168.1.20", 20002),
//!     ChannelConfig::default(),
//!     EngineConfig::default(),
//! );
//! let mut statuses = engine.subscribe();
//! engine.open().await?;
//! engine.login().await?;
//! while let Ok(status) = statuses.recv().await {
//!     if status.is_final() {
//!         break;
//!     }
//! }
//! engine.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! The state machine itself lives in [`Correlator`] and performs no I/O.

pub mod amount;
pub mod correlator;
pub mod engine;
pub mod error;
pub mod status;

pub use amount::{minor_units, rescale};
pub use correlator::{Begun, Correlator, PendingOperation, Request, Step};
pub use engine::{EngineConfig, OpiEngine};
pub use error::{RequestError, Result};
pub use status::{
    ErrorReason, OperationKind, OperationResult, OperationStatus, Outcome, StatusError,
    TransactionData,
};
