//! Typed OPI messages and their XML wire representation.
//!
//! Pure conversion layer, no I/O. The engine builds requests from these
//! types, and every inbound text is classified by its root element before it
//! is deserialized.

pub mod card;
pub mod codec;
pub mod device;
pub mod error;
pub mod kind;
pub mod service;
pub mod types;

pub use card::{
    Authorisation, CardRequestType, CardServiceRequest, CardServiceResponse, OriginalTransaction,
    Tender,
};
pub use codec::{decode, deserialize, serialize, OpiMessage, XML_DECLARATION};
pub use device::{DeviceRequest, DeviceRequestType, DeviceResponse, Output, OutputResult};
pub use error::{MessageError, Result};
pub use kind::{sniff_kind, MessageKind};
pub use service::{ServiceRequest, ServiceRequestType, ServiceResponse};
pub use types::{DeviceTarget, OverallResult, PosData, Terminal, TotalAmount};
