//! The operation state machine.
//!
//! [`Correlator`] owns the single pending operation, turns requests into wire
//! text and interprets every inbound message against what is pending. It does
//! no I/O: callers send the text it returns and publish the statuses it
//! yields, in order.

use chrono::{DateTime, Utc};
use opilink_message::{
    decode, serialize, Authorisation, CardRequestType, CardServiceRequest, DeviceRequest,
    DeviceRequestType, DeviceResponse, DeviceTarget, OpiMessage, OriginalTransaction,
    OverallResult, PosData, ServiceRequest, ServiceRequestType, Terminal, TotalAmount,
};
use rust_decimal::Decimal;
use tracing::{debug, info, trace, warn};

use crate::amount::{currency_code, rescale};
use crate::error::{RequestError, Result};
use crate::status::{
    ErrorReason, OperationKind, OperationResult, OperationStatus, Outcome, TransactionData,
};

/// A logical terminal operation, as requested by the POS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login,
    Logoff,
    /// `amount` is in minor units of `currency`.
    Payment {
        amount: Decimal,
        currency: String,
    },
    Refund {
        amount: Decimal,
        currency: String,
    },
    /// `reference_id` is the STAN of the transaction to reverse.
    Reversal {
        reference_id: String,
    },
    Reconciliation,
}

impl Request {
    pub fn kind(&self) -> OperationKind {
        match self {
            Request::Login => OperationKind::Login,
            Request::Logoff => OperationKind::Logoff,
            Request::Payment { .. } => OperationKind::Payment,
            Request::Refund { .. } => OperationKind::Refund,
            Request::Reversal { .. } => OperationKind::Reversal,
            Request::Reconciliation => OperationKind::Reconciliation,
        }
    }
}

/// The one operation awaiting its terminating response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub request_id: String,
    pub started_at: DateTime<Utc>,
    pub message_lines: Vec<String>,
    pub customer_receipt: Option<String>,
    pub merchant_receipt: Option<String>,
}

impl PendingOperation {
    /// Display lines, each followed by a newline.
    pub fn message(&self) -> String {
        self.message_lines
            .iter()
            .map(|line| format!("{line}\n"))
            .collect()
    }
}

/// A request accepted by [`Correlator::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Begun {
    pub request_id: String,
    pub wire: String,
    pub status: OperationStatus,
}

/// What an inbound message produced: replies to send, then statuses to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub outbound: Vec<String>,
    pub statuses: Vec<OperationStatus>,
}

impl Step {
    fn status(status: OperationStatus) -> Self {
        Self {
            outbound: Vec::new(),
            statuses: vec![status],
        }
    }
}

#[derive(Debug)]
pub struct Correlator {
    application_sender: String,
    workstation_id: String,
    pending: Option<PendingOperation>,
    logged_in: bool,
    next_request_id: u64,
}

impl Correlator {
    pub fn new(application_sender: impl Into<String>, workstation_id: impl Into<String>) -> Self {
        Self {
            application_sender: application_sender.into(),
            workstation_id: workstation_id.into(),
            pending: None,
            logged_in: false,
            next_request_id: 1,
        }
    }

    pub fn pending(&self) -> Option<&PendingOperation> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Build the wire text for `request` and make it the pending operation.
    ///
    /// Nothing changes when this fails.
    pub fn begin(&mut self, request: &Request, now: DateTime<Utc>) -> Result<Begun> {
        if self.pending.is_some() {
            return Err(RequestError::OperationInProgress);
        }

        let request_id = self.next_request_id.to_string();
        let message = self.build(request, &request_id, now)?;
        let wire = serialize(&message)?;
        self.next_request_id += 1;

        let kind = request.kind();
        let status = match kind {
            OperationKind::Login => OperationStatus::PendingLogin,
            kind => OperationStatus::PendingOperation {
                kind,
                message: String::new(),
            },
        };
        self.pending = Some(PendingOperation {
            kind,
            request_id: request_id.clone(),
            started_at: now,
            message_lines: Vec::new(),
            customer_receipt: None,
            merchant_receipt: None,
        });
        info!(%kind, request_id = %request_id, "operation started");

        Ok(Begun {
            request_id,
            wire,
            status,
        })
    }

    /// Wire text asking the terminal to abort the pending operation.
    ///
    /// The operation stays pending until the terminal answers it.
    pub fn abort(&mut self, now: DateTime<Utc>) -> Result<String> {
        let Some(pending) = &self.pending else {
            return Err(RequestError::NoOperationPending);
        };

        let request_id = self.next_request_id.to_string();
        let message = OpiMessage::CardServiceRequest(CardServiceRequest {
            request_type: CardRequestType::AbortRequest,
            application_sender: self.application_sender.clone(),
            workstation_id: self.workstation_id.clone(),
            request_id: request_id.clone(),
            pos_data: pos_data(now),
            original_transaction: Some(OriginalTransaction {
                stan: None,
                request_id: Some(pending.request_id.clone()),
            }),
            total_amount: None,
        });
        let wire = serialize(&message)?;
        self.next_request_id += 1;
        info!(
            kind = %pending.kind,
            request_id = %pending.request_id,
            abort_request_id = %request_id,
            "abort requested"
        );
        Ok(wire)
    }

    /// Interpret one inbound message.
    pub fn handle_inbound(&mut self, raw: &str, now: DateTime<Utc>) -> Step {
        trace!(raw, "inbound message");
        let message = match decode(raw) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "failed to decode inbound message");
                if let Some(pending) = self.pending.take() {
                    debug!(kind = %pending.kind, request_id = %pending.request_id, "pending operation dropped");
                }
                return Step::status(OperationStatus::error(
                    ErrorReason::DataHandling,
                    err.to_string(),
                    Some(raw.to_string()),
                ));
            }
        };

        match message {
            OpiMessage::DeviceRequest(request) => self.on_device_request(&request),
            OpiMessage::ServiceResponse(response) => {
                let kind = match response.request_type {
                    ServiceRequestType::Login => OperationKind::Login,
                    ServiceRequestType::Logoff => OperationKind::Logoff,
                    ServiceRequestType::Reconciliation => OperationKind::Reconciliation,
                };
                let transaction = transaction_data(response.terminal.as_ref(), None);
                self.on_response(
                    Some(kind),
                    response.request_id.as_deref(),
                    response.overall_result,
                    transaction,
                    raw,
                    now,
                )
            }
            OpiMessage::CardServiceResponse(response) => {
                let kind = match response.request_type {
                    CardRequestType::CardPayment => Some(OperationKind::Payment),
                    CardRequestType::PaymentRefund => Some(OperationKind::Refund),
                    CardRequestType::PaymentReversal => Some(OperationKind::Reversal),
                    CardRequestType::AbortRequest => None,
                };
                let authorisation = response
                    .tender
                    .as_ref()
                    .and_then(|tender| tender.authorisation.as_ref());
                let transaction = transaction_data(response.terminal.as_ref(), authorisation);
                self.on_response(
                    kind,
                    response.request_id.as_deref(),
                    response.overall_result,
                    transaction,
                    raw,
                    now,
                )
            }
            other => {
                debug!(kind = %other.kind(), "ignoring unexpected inbound message");
                Step::default()
            }
        }
    }

    /// Give up on the pending operation after its deadline passed.
    pub fn timeout(&mut self) -> Option<OperationStatus> {
        let pending = self.pending.take()?;
        warn!(kind = %pending.kind, request_id = %pending.request_id, "operation timed out");
        Some(OperationStatus::error(
            ErrorReason::Communication,
            format!(
                "no response from terminal to {} request {}",
                pending.kind, pending.request_id
            ),
            None,
        ))
    }

    /// Forget everything, silently dropping a pending operation.
    pub fn close(&mut self) -> OperationStatus {
        if let Some(pending) = self.pending.take() {
            debug!(kind = %pending.kind, request_id = %pending.request_id, "pending operation discarded on close");
        }
        self.logged_in = false;
        OperationStatus::Idle
    }

    fn build(&self, request: &Request, request_id: &str, now: DateTime<Utc>) -> Result<OpiMessage> {
        let service = |request_type: ServiceRequestType| {
            OpiMessage::ServiceRequest(ServiceRequest {
                request_type,
                application_sender: self.application_sender.clone(),
                workstation_id: self.workstation_id.clone(),
                request_id: request_id.to_string(),
                pos_data: pos_data(now),
            })
        };
        let card = |request_type: CardRequestType,
                    original_transaction: Option<OriginalTransaction>,
                    total_amount: Option<TotalAmount>| {
            OpiMessage::CardServiceRequest(CardServiceRequest {
                request_type,
                application_sender: self.application_sender.clone(),
                workstation_id: self.workstation_id.clone(),
                request_id: request_id.to_string(),
                pos_data: pos_data(now),
                original_transaction,
                total_amount,
            })
        };

        Ok(match request {
            Request::Login => service(ServiceRequestType::Login),
            Request::Logoff => service(ServiceRequestType::Logoff),
            Request::Reconciliation => service(ServiceRequestType::Reconciliation),
            Request::Payment { amount, currency } => card(
                CardRequestType::CardPayment,
                None,
                Some(total_amount(*amount, currency)?),
            ),
            Request::Refund { amount, currency } => card(
                CardRequestType::PaymentRefund,
                None,
                Some(total_amount(*amount, currency)?),
            ),
            Request::Reversal { reference_id } => card(
                CardRequestType::PaymentReversal,
                Some(OriginalTransaction {
                    stan: Some(reference_id.clone()),
                    request_id: None,
                }),
                None,
            ),
        })
    }

    fn on_device_request(&mut self, request: &DeviceRequest) -> Step {
        let mut step = Step::default();
        let ack = DeviceResponse::acknowledge(request, &self.application_sender, &self.workstation_id);
        match serialize(&OpiMessage::DeviceResponse(ack)) {
            Ok(wire) => step.outbound.push(wire),
            Err(err) => warn!(error = %err, request_id = %request.request_id, "failed to build device acknowledgement"),
        }

        let Some(pending) = self.pending.as_mut() else {
            debug!(request_id = %request.request_id, "device request without pending operation");
            return step;
        };
        let output = match (request.request_type, request.output.as_ref()) {
            (DeviceRequestType::Output, Some(output)) => output,
            _ => {
                debug!(request_id = %request.request_id, "device request carries no output");
                return step;
            }
        };

        match output.target {
            target if target.is_display() => {
                pending.message_lines.extend(output.text_lines.iter().cloned());
                if pending.kind != OperationKind::Login {
                    step.statuses.push(OperationStatus::PendingOperation {
                        kind: pending.kind,
                        message: pending.message(),
                    });
                }
            }
            DeviceTarget::Printer => {
                pending.customer_receipt = Some(output.text_lines.join("\n"));
                debug!(request_id = %pending.request_id, "customer receipt received");
            }
            DeviceTarget::PrinterReceipt => {
                pending.merchant_receipt = Some(output.text_lines.join("\n"));
                debug!(request_id = %pending.request_id, "merchant receipt received");
            }
            _ => {
                debug!(request_id = %pending.request_id, lines = ?output.text_lines, "e-journal output");
            }
        }
        step
    }

    fn on_response(
        &mut self,
        kind: Option<OperationKind>,
        request_id: Option<&str>,
        overall_result: OverallResult,
        transaction: Option<TransactionData>,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Step {
        let Some(pending) = &self.pending else {
            debug!(?request_id, "response without pending operation ignored");
            return Step::default();
        };
        if request_id != Some(pending.request_id.as_str()) {
            debug!(
                ?request_id,
                expected = %pending.request_id,
                "response with foreign or missing request id ignored"
            );
            return Step::default();
        }
        if kind != Some(pending.kind) {
            debug!(?kind, expected = %pending.kind, "response of another kind ignored");
            return Step::default();
        }
        let Some(pending) = self.pending.take() else {
            return Step::default();
        };

        let outcome = Outcome::from_overall(overall_result);
        info!(
            kind = %pending.kind,
            request_id = %pending.request_id,
            result = overall_result.as_str(),
            "operation finished"
        );
        match (pending.kind, outcome) {
            (OperationKind::Login, Outcome::Success) => {
                self.logged_in = true;
                return Step::status(OperationStatus::LoggedIn);
            }
            (OperationKind::Logoff, Outcome::Success) => self.logged_in = false,
            _ => {}
        }

        Step::status(OperationStatus::Result(OperationResult {
            kind: pending.kind,
            outcome,
            date: now,
            customer_receipt: pending.customer_receipt,
            merchant_receipt: pending.merchant_receipt,
            raw_data: raw.to_string(),
            overall_result,
            transaction,
        }))
    }
}

fn pos_data(now: DateTime<Utc>) -> PosData {
    PosData::new(now.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string())
}

fn total_amount(amount: Decimal, currency: &str) -> Result<TotalAmount> {
    Ok(TotalAmount::new(rescale(amount, currency)?, currency_code(currency)?))
}

fn transaction_data(
    terminal: Option<&Terminal>,
    authorisation: Option<&Authorisation>,
) -> Option<TransactionData> {
    let terminal = terminal?;
    Some(TransactionData {
        terminal_id: terminal.terminal_id.clone(),
        transaction_id: terminal.stan.clone(),
        card_circuit: authorisation.and_then(|a| a.card_circuit.clone()),
        card_pan: authorisation.and_then(|a| a.card_pan.clone()),
        payment_provider: authorisation.and_then(|a| a.acquirer_id.clone()),
    })
}
