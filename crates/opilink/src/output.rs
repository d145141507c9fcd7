use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use opilink_engine::{ErrorReason, OperationKind, OperationStatus, Outcome};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    operation: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<u8>,
    timestamp: String,
    #[serde(flatten)]
    status: &'a OperationStatus,
}

/// Print one published status. `operation` is the request it belongs to.
pub fn print_status(status: &OperationStatus, operation: OperationKind, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = StatusOutput {
                operation,
                code: status.result_code(),
                timestamp: now_unix_seconds(),
                status,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OPERATION", "STATUS", "CODE", "DETAIL"])
                .add_row(vec![
                    operation.to_string(),
                    status.name().to_string(),
                    code_text(status),
                    detail(status),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "operation={} status={} code={} {}",
                operation,
                status.name(),
                code_text(status),
                detail(status).replace('\n', " | ")
            );
        }
    }
}

fn code_text(status: &OperationStatus) -> String {
    status
        .result_code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn detail(status: &OperationStatus) -> String {
    match status {
        OperationStatus::Idle => String::new(),
        OperationStatus::PendingLogin => "waiting for the terminal".to_string(),
        OperationStatus::PendingOperation { message, .. } => message.trim_end().to_string(),
        OperationStatus::LoggedIn => "logged in".to_string(),
        OperationStatus::Error(error) => {
            let reason = match error.reason {
                ErrorReason::NotInitialised => "not initialised",
                ErrorReason::Communication => "communication",
                ErrorReason::DataHandling => "data handling",
            };
            format!("{reason}: {}", error.message)
        }
        OperationStatus::Result(result) => {
            let outcome = match result.outcome {
                Outcome::Success => "success",
                Outcome::Error => "error",
                Outcome::Cancelled => "cancelled",
            };
            let mut lines = vec![format!("{outcome} ({})", result.overall_result.as_str())];
            if let Some(transaction) = &result.transaction {
                lines.push(format!("terminal {}", transaction.terminal_id));
                if let Some(stan) = &transaction.transaction_id {
                    lines.push(format!("stan {stan}"));
                }
            }
            if let Some(receipt) = &result.customer_receipt {
                lines.push(receipt.clone());
            }
            lines.join("\n")
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
