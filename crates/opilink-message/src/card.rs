//! `CardServiceRequest` / `CardServiceResponse`: money-moving exchanges.

use serde::{Deserialize, Serialize};

use crate::types::{OverallResult, PosData, Terminal, TotalAmount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardRequestType {
    CardPayment,
    PaymentRefund,
    PaymentReversal,
    AbortRequest,
}

/// Identifies the transaction a reversal (or abort) refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalTransaction {
    #[serde(rename = "@STAN", default, skip_serializing_if = "Option::is_none")]
    pub stan: Option<String>,
    #[serde(
        rename = "@RequestID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "CardServiceRequest")]
pub struct CardServiceRequest {
    #[serde(rename = "@RequestType")]
    pub request_type: CardRequestType,
    #[serde(rename = "@ApplicationSender")]
    pub application_sender: String,
    #[serde(rename = "@WorkstationID")]
    pub workstation_id: String,
    #[serde(rename = "@RequestID")]
    pub request_id: String,
    #[serde(rename = "POSdata")]
    pub pos_data: PosData,
    #[serde(
        rename = "OriginalTransaction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub original_transaction: Option<OriginalTransaction>,
    #[serde(
        rename = "TotalAmount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_amount: Option<TotalAmount>,
}

/// Card and acquirer details of an authorised tender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorisation {
    #[serde(
        rename = "@AcquirerID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub acquirer_id: Option<String>,
    #[serde(rename = "@CardPAN", default, skip_serializing_if = "Option::is_none")]
    pub card_pan: Option<String>,
    #[serde(
        rename = "@CardCircuit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub card_circuit: Option<String>,
    #[serde(
        rename = "@ApprovalCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tender {
    #[serde(
        rename = "TotalAmount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_amount: Option<TotalAmount>,
    #[serde(
        rename = "Authorisation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authorisation: Option<Authorisation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "CardServiceResponse")]
pub struct CardServiceResponse {
    #[serde(rename = "@RequestType")]
    pub request_type: CardRequestType,
    #[serde(
        rename = "@ApplicationSender",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub application_sender: Option<String>,
    #[serde(
        rename = "@WorkstationID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub workstation_id: Option<String>,
    #[serde(rename = "@RequestID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "@OverallResult")]
    pub overall_result: OverallResult,
    #[serde(rename = "Terminal", default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Terminal>,
    #[serde(rename = "Tender", default, skip_serializing_if = "Option::is_none")]
    pub tender: Option<Tender>,
}
