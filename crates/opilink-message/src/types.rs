//! Elements and attribute values shared by several message kinds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `OverallResult` attribute of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallResult {
    Success,
    PartialFailure,
    Failure,
    DeviceUnavailable,
    Busy,
    Loggedout,
    Aborted,
    TimedOut,
    CommunicationError,
    FormatError,
    ParsingError,
    ValidationError,
    MissingMandatoryData,
}

impl OverallResult {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallResult::Success => "Success",
            OverallResult::PartialFailure => "PartialFailure",
            OverallResult::Failure => "Failure",
            OverallResult::DeviceUnavailable => "DeviceUnavailable",
            OverallResult::Busy => "Busy",
            OverallResult::Loggedout => "Loggedout",
            OverallResult::Aborted => "Aborted",
            OverallResult::TimedOut => "TimedOut",
            OverallResult::CommunicationError => "CommunicationError",
            OverallResult::FormatError => "FormatError",
            OverallResult::ParsingError => "ParsingError",
            OverallResult::ValidationError => "ValidationError",
            OverallResult::MissingMandatoryData => "MissingMandatoryData",
        }
    }
}

/// Where a device `Output` is meant to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTarget {
    CashierDisplay,
    CustomerDisplay,
    /// Customer copy of the receipt.
    Printer,
    /// Merchant copy of the receipt.
    PrinterReceipt,
    #[serde(rename = "E-Journal")]
    EJournal,
}

impl DeviceTarget {
    pub fn is_display(self) -> bool {
        matches!(self, DeviceTarget::CashierDisplay | DeviceTarget::CustomerDisplay)
    }
}

/// `<POSdata>` block carried by every POS-originated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosData {
    #[serde(rename = "POSTimeStamp")]
    pub pos_timestamp: String,
}

impl PosData {
    pub fn new(pos_timestamp: impl Into<String>) -> Self {
        Self {
            pos_timestamp: pos_timestamp.into(),
        }
    }
}

/// `<Terminal>` block identifying the terminal and the transaction it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    #[serde(rename = "@TerminalID")]
    pub terminal_id: String,
    #[serde(
        rename = "@TerminalBatch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub terminal_batch: Option<String>,
    #[serde(rename = "@STAN", default, skip_serializing_if = "Option::is_none")]
    pub stan: Option<String>,
}

/// `<TotalAmount Currency="EUR">1.000</TotalAmount>`.
///
/// The text keeps the exact scale it was built or received with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalAmount {
    #[serde(rename = "@Currency")]
    pub currency: String,
    #[serde(rename = "$text", with = "rust_decimal::serde::str")]
    pub value: Decimal,
}

impl TotalAmount {
    pub fn new(value: Decimal, currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            value,
        }
    }
}
