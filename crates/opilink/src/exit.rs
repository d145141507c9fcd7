use std::fmt;
use std::io;

use opilink_engine::{ErrorReason, OperationStatus, Outcome, RequestError};
use opilink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CANCELLED: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, addr } => {
            io_error(&format!("{context}: cannot listen on {addr}"), source)
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
        TransportError::WriteTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn request_error(context: &str, err: RequestError) -> CliError {
    match err {
        RequestError::Transport(err) => transport_error(context, err),
        RequestError::NotInitialised => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        RequestError::InvalidAmount { .. } | RequestError::InvalidCurrency(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        RequestError::DataHandling(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RequestError::OperationInProgress | RequestError::NoOperationPending => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

/// Exit code for the status an operation ended with.
pub fn status_code(status: &OperationStatus) -> i32 {
    match status {
        OperationStatus::LoggedIn => SUCCESS,
        OperationStatus::Result(result) => match result.outcome {
            Outcome::Success => SUCCESS,
            Outcome::Error => FAILURE,
            Outcome::Cancelled => CANCELLED,
        },
        OperationStatus::Error(error) => match error.reason {
            ErrorReason::NotInitialised => TRANSPORT_ERROR,
            ErrorReason::Communication => TIMEOUT,
            ErrorReason::DataHandling => DATA_INVALID,
        },
        OperationStatus::Idle
        | OperationStatus::PendingLogin
        | OperationStatus::PendingOperation { .. } => INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_exit_codes() {
        assert_eq!(
            request_error("pay", RequestError::NotInitialised).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            request_error("pay", RequestError::InvalidCurrency("E1".into())).code,
            USAGE
        );
        assert_eq!(
            request_error(
                "pay",
                RequestError::InvalidAmount {
                    amount: "-1".into(),
                    reason: "negative".into(),
                }
            )
            .code,
            USAGE
        );
        assert_eq!(
            request_error("pay", RequestError::OperationInProgress).code,
            FAILURE
        );
        assert_eq!(request_error("pay", RequestError::EngineClosed).code, INTERNAL);
    }

    #[test]
    fn transport_errors_map_to_exit_codes() {
        let refused = TransportError::Connect {
            url: "ws://127.0.0.1:1".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(transport_error("open", refused).code, TRANSPORT_ERROR);

        let denied = TransportError::Bind {
            addr: "0.0.0.0:80".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(transport_error("open", denied).code, PERMISSION_DENIED);
    }

    #[test]
    fn final_statuses_map_to_exit_codes() {
        assert_eq!(status_code(&OperationStatus::LoggedIn), SUCCESS);
        assert_eq!(status_code(&OperationStatus::PendingLogin), INTERNAL);
    }
}
