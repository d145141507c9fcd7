//! Published operation statuses.

use std::fmt;

use chrono::{DateTime, Utc};
use opilink_message::OverallResult;
use serde::Serialize;

/// The logical terminal operation a request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Login,
    Logoff,
    Payment,
    Refund,
    Reversal,
    Reconciliation,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Login => "login",
            OperationKind::Logoff => "logoff",
            OperationKind::Payment => "payment",
            OperationKind::Refund => "refund",
            OperationKind::Reversal => "reversal",
            OperationKind::Reconciliation => "reconciliation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// A request was issued without a connected terminal.
    NotInitialised,
    /// No terminating response arrived in time.
    Communication,
    /// An inbound message could not be decoded.
    DataHandling,
}

impl ErrorReason {
    pub fn result_code(self) -> u8 {
        match self {
            ErrorReason::NotInitialised => 10,
            ErrorReason::Communication => 11,
            ErrorReason::DataHandling => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusError {
    pub reason: ErrorReason,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    Cancelled,
}

impl Outcome {
    /// `Success` for success, `Cancelled` for `Aborted`, `Error` otherwise.
    pub fn from_overall(result: OverallResult) -> Self {
        match result {
            OverallResult::Success => Outcome::Success,
            OverallResult::Aborted => Outcome::Cancelled,
            _ => Outcome::Error,
        }
    }

    pub fn result_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Error => 1,
            Outcome::Cancelled => 2,
        }
    }
}

/// Transaction details reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionData {
    pub terminal_id: String,
    pub transaction_id: Option<String>,
    pub card_circuit: Option<String>,
    pub card_pan: Option<String>,
    pub payment_provider: Option<String>,
}

/// Final result of an operation the terminal answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub outcome: Outcome,
    pub date: DateTime<Utc>,
    pub customer_receipt: Option<String>,
    pub merchant_receipt: Option<String>,
    pub raw_data: String,
    pub overall_result: OverallResult,
    pub transaction: Option<TransactionData>,
}

/// Everything observers of an engine ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationStatus {
    Idle,
    PendingLogin,
    PendingOperation {
        kind: OperationKind,
        /// Accumulated display lines, each followed by `\n`.
        message: String,
    },
    LoggedIn,
    Error(StatusError),
    Result(OperationResult),
}

impl OperationStatus {
    pub(crate) fn error(
        reason: ErrorReason,
        message: impl Into<String>,
        raw_data: Option<String>,
    ) -> Self {
        OperationStatus::Error(StatusError {
            reason,
            message: message.into(),
            raw_data,
        })
    }

    /// Stable numeric code of a final status. `None` while still in flight.
    pub fn result_code(&self) -> Option<u8> {
        match self {
            OperationStatus::LoggedIn => Some(0),
            OperationStatus::Error(error) => Some(error.reason.result_code()),
            OperationStatus::Result(result) => Some(result.outcome.result_code()),
            OperationStatus::Idle
            | OperationStatus::PendingLogin
            | OperationStatus::PendingOperation { .. } => None,
        }
    }

    /// Whether this status ends the operation that produced it.
    pub fn is_final(&self) -> bool {
        self.result_code().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            OperationStatus::Idle => "idle",
            OperationStatus::PendingLogin => "pending_login",
            OperationStatus::PendingOperation { .. } => "pending_operation",
            OperationStatus::LoggedIn => "logged_in",
            OperationStatus::Error(_) => "error",
            OperationStatus::Result(_) => "result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome) -> OperationStatus {
        OperationStatus::Result(OperationResult {
            kind: OperationKind::Payment,
            outcome,
            date: DateTime::<Utc>::UNIX_EPOCH,
            customer_receipt: None,
            merchant_receipt: None,
            raw_data: String::new(),
            overall_result: OverallResult::Success,
            transaction: None,
        })
    }

    #[test]
    fn result_codes_are_stable() {
        assert_eq!(result(Outcome::Success).result_code(), Some(0));
        assert_eq!(result(Outcome::Error).result_code(), Some(1));
        assert_eq!(result(Outcome::Cancelled).result_code(), Some(2));
        for (reason, code) in [
            (ErrorReason::NotInitialised, 10),
            (ErrorReason::Communication, 11),
            (ErrorReason::DataHandling, 12),
        ] {
            assert_eq!(
                OperationStatus::error(reason, "x", None).result_code(),
                Some(code)
            );
        }
        assert_eq!(OperationStatus::Idle.result_code(), None);
        assert_eq!(OperationStatus::PendingLogin.result_code(), None);
    }

    #[test]
    fn outcome_follows_overall_result() {
        assert_eq!(Outcome::from_overall(OverallResult::Success), Outcome::Success);
        assert_eq!(Outcome::from_overall(OverallResult::Aborted), Outcome::Cancelled);
        assert_eq!(Outcome::from_overall(OverallResult::Failure), Outcome::Error);
        assert_eq!(Outcome::from_overall(OverallResult::Busy), Outcome::Error);
    }

    #[test]
    fn statuses_serialize_with_tag() {
        let pending = OperationStatus::PendingOperation {
            kind: OperationKind::Refund,
            message: "Insert card\n".to_string(),
        };
        let json = serde_json::to_value(&pending).expect("status should serialize");
        assert_eq!(json["status"], "pending_operation");
        assert_eq!(json["kind"], "refund");
        assert_eq!(json["message"], "Insert card\n");

        let error = OperationStatus::error(ErrorReason::DataHandling, "bad xml", Some("<".into()));
        let json = serde_json::to_value(&error).expect("status should serialize");
        assert_eq!(json["status"], "error");
        assert_eq!(json["reason"], "data_handling");
        assert_eq!(json["raw_data"], "<");
    }
}
