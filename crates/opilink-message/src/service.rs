//! `ServiceRequest` / `ServiceResponse`: session and administrative exchanges.

use serde::{Deserialize, Serialize};

use crate::types::{OverallResult, PosData, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceRequestType {
    Login,
    Logoff,
    Reconciliation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "ServiceRequest")]
pub struct ServiceRequest {
    #[serde(rename = "@RequestType")]
    pub request_type: ServiceRequestType,
    #[serde(rename = "@ApplicationSender")]
    pub application_sender: String,
    #[serde(rename = "@WorkstationID")]
    pub workstation_id: String,
    #[serde(rename = "@RequestID")]
    pub request_id: String,
    #[serde(rename = "POSdata")]
    pub pos_data: PosData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "ServiceResponse")]
pub struct ServiceResponse {
    #[serde(rename = "@RequestType")]
    pub request_type: ServiceRequestType,
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
    /// Terminals occasionally answer without echoing the id.
    #[serde(rename = "@RequestID", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "@OverallResult")]
    pub overall_result: OverallResult,
    #[serde(rename = "Terminal", default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Terminal>,
}
