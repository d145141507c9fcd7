//! `DeviceRequest` / `DeviceResponse`: terminal-initiated display and print
//! instructions, acknowledged by the POS.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceTarget, OverallResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceRequestType {
    Output,
    Input,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "@OutDeviceTarget")]
    pub target: DeviceTarget,
    #[serde(rename = "TextLine", default, skip_serializing_if = "Vec::is_empty")]
    pub text_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "DeviceRequest")]
pub struct DeviceRequest {
    #[serde(rename = "@RequestType")]
    pub request_type: DeviceRequestType,
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
    #[serde(rename = "@RequestID")]
    pub request_id: String,
    #[serde(rename = "Output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputResult {
    #[serde(rename = "@OutDeviceTarget")]
    pub target: DeviceTarget,
    #[serde(rename = "@OutResult")]
    pub out_result: OverallResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "DeviceResponse")]
pub struct DeviceResponse {
    #[serde(rename = "@RequestType")]
    pub request_type: DeviceRequestType,
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
    #[serde(rename = "Output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputResult>,
}

impl DeviceResponse {
    /// Successful acknowledgement of `request`, echoing its id and target.
    pub fn acknowledge(
        request: &DeviceRequest,
        application_sender: &str,
        workstation_id: &str,
    ) -> Self {
        Self {
            request_type: request.request_type,
            application_sender: Some(application_sender.to_owned()),
            workstation_id: Some(workstation_id.to_owned()),
            request_id: Some(request.request_id.clone()),
            overall_result: OverallResult::Success,
            output: request.output.as_ref().map(|output| OutputResult {
                target: output.target,
                out_result: OverallResult::Success,
            }),
        }
    }
}
