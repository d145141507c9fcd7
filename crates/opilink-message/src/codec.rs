use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::card::{CardServiceRequest, CardServiceResponse};
use crate::device::{DeviceRequest, DeviceResponse};
use crate::error::{MessageError, Result};
use crate::kind::{sniff_kind, MessageKind};
use crate::service::{ServiceRequest, ServiceResponse};
use crate::types::OverallResult;

/// Prepended to every serialized message.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Any OPI message, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpiMessage {
    ServiceRequest(ServiceRequest),
    ServiceResponse(ServiceResponse),
    CardServiceRequest(CardServiceRequest),
    CardServiceResponse(CardServiceResponse),
    DeviceRequest(DeviceRequest),
    DeviceResponse(DeviceResponse),
}

impl OpiMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            OpiMessage::ServiceRequest(_) => MessageKind::ServiceRequest,
            OpiMessage::ServiceResponse(_) => MessageKind::ServiceResponse,
            OpiMessage::CardServiceRequest(_) => MessageKind::CardServiceRequest,
            OpiMessage::CardServiceResponse(_) => MessageKind::CardServiceResponse,
            OpiMessage::DeviceRequest(_) => MessageKind::DeviceRequest,
            OpiMessage::DeviceResponse(_) => MessageKind::DeviceResponse,
        }
    }

    /// Correlation id, when the message carries one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            OpiMessage::ServiceRequest(m) => Some(&m.request_id),
            OpiMessage::ServiceResponse(m) => m.request_id.as_deref(),
            OpiMessage::CardServiceRequest(m) => Some(&m.request_id),
            OpiMessage::CardServiceResponse(m) => m.request_id.as_deref(),
            OpiMessage::DeviceRequest(m) => Some(&m.request_id),
            OpiMessage::DeviceResponse(m) => m.request_id.as_deref(),
        }
    }

    /// `OverallResult` of a response; `None` for requests.
    pub fn overall_result(&self) -> Option<OverallResult> {
        match self {
            OpiMessage::ServiceResponse(m) => Some(m.overall_result),
            OpiMessage::CardServiceResponse(m) => Some(m.overall_result),
            OpiMessage::DeviceResponse(m) => Some(m.overall_result),
            _ => None,
        }
    }
}

/// Render a message as XML text, including the XML declaration.
pub fn serialize(message: &OpiMessage) -> Result<String> {
    let body = match message {
        OpiMessage::ServiceRequest(m) => to_xml(m, message.kind()),
        OpiMessage::ServiceResponse(m) => to_xml(m, message.kind()),
        OpiMessage::CardServiceRequest(m) => to_xml(m, message.kind()),
        OpiMessage::CardServiceResponse(m) => to_xml(m, message.kind()),
        OpiMessage::DeviceRequest(m) => to_xml(m, message.kind()),
        OpiMessage::DeviceResponse(m) => to_xml(m, message.kind()),
    }?;
    Ok(format!("{XML_DECLARATION}{body}"))
}

/// Parse `text` as a message of the `expected` kind.
pub fn deserialize(text: &str, expected: MessageKind) -> Result<OpiMessage> {
    let actual = sniff_kind(text)?;
    if actual != expected {
        return Err(MessageError::UnexpectedKind {
            expected,
            actual,
            raw: text.to_owned(),
        });
    }
    parse_as(text, actual)
}

/// Parse `text` as whatever kind its root element names.
pub fn decode(text: &str) -> Result<OpiMessage> {
    let kind = sniff_kind(text)?;
    parse_as(text, kind)
}

fn parse_as(text: &str, kind: MessageKind) -> Result<OpiMessage> {
    let message = match kind {
        MessageKind::ServiceRequest => OpiMessage::ServiceRequest(from_xml(text)?),
        MessageKind::ServiceResponse => OpiMessage::ServiceResponse(from_xml(text)?),
        MessageKind::CardServiceRequest => OpiMessage::CardServiceRequest(from_xml(text)?),
        MessageKind::CardServiceResponse => OpiMessage::CardServiceResponse(from_xml(text)?),
        MessageKind::DeviceRequest => OpiMessage::DeviceRequest(from_xml(text)?),
        MessageKind::DeviceResponse => OpiMessage::DeviceResponse(from_xml(text)?),
    };
    Ok(message)
}

fn to_xml<T: Serialize>(value: &T, kind: MessageKind) -> Result<String> {
    quick_xml::se::to_string(value).map_err(|err| MessageError::Serialize {
        kind,
        reason: err.to_string(),
    })
}

fn from_xml<T: DeserializeOwned>(text: &str) -> Result<T> {
    quick_xml::de::from_str(text).map_err(|err| MessageError::Malformed {
        reason: err.to_string(),
        raw: text.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::card::{Authorisation, CardRequestType, OriginalTransaction, Tender};
    use crate::device::{DeviceRequestType, Output};
    use crate::service::ServiceRequestType;
    use crate::types::{DeviceTarget, PosData, Terminal, TotalAmount};

    fn payment_request() -> OpiMessage {
        OpiMessage::CardServiceRequest(CardServiceRequest {
            request_type: CardRequestType::CardPayment,
            application_sender: "POS".to_string(),
            workstation_id: "POS1".to_string(),
            request_id: "17".to_string(),
            pos_data: PosData::new("2026-03-01T10:15:00Z"),
            original_transaction: None,
            total_amount: Some(TotalAmount::new(Decimal::new(1000, 3), "EUR")),
        })
    }

    #[test]
    fn serialized_request_has_declaration_and_attributes() {
        let text = serialize(&payment_request()).unwrap();

        assert!(text.starts_with(XML_DECLARATION));
        assert!(text.contains("<CardServiceRequest "));
        assert!(text.contains("RequestType=\"CardPayment\""));
        assert!(text.contains("RequestID=\"17\""));
        assert!(text.contains("<TotalAmount Currency=\"EUR\">1.000</TotalAmount>"));
        assert!(!text.contains("OriginalTransaction"));
    }

    #[test]
    fn roundtrip_preserves_every_kind() {
        let messages = vec![
            OpiMessage::ServiceRequest(ServiceRequest {
                request_type: ServiceRequestType::Login,
                application_sender: "POS".to_string(),
                workstation_id: "POS1".to_string(),
                request_id: "1".to_string(),
                pos_data: PosData::new("2026-03-01T10:00:00Z"),
            }),
            OpiMessage::ServiceResponse(ServiceResponse {
                request_type: ServiceRequestType::Reconciliation,
                application_sender: Some("EFT".to_string()),
                workstation_id: Some("POS1".to_string()),
                request_id: Some("2".to_string()),
                overall_result: OverallResult::Failure,
                terminal: Some(Terminal {
                    terminal_id: "T-77".to_string(),
                    terminal_batch: Some("12".to_string()),
                    stan: None,
                }),
            }),
            payment_request(),
            OpiMessage::CardServiceRequest(CardServiceRequest {
                request_type: CardRequestType::PaymentReversal,
                application_sender: "POS".to_string(),
                workstation_id: "POS1".to_string(),
                request_id: "18".to_string(),
                pos_data: PosData::new("2026-03-01T10:16:00Z"),
                original_transaction: Some(OriginalTransaction {
                    stan: Some("000123".to_string()),
                    request_id: None,
                }),
                total_amount: None,
            }),
            OpiMessage::CardServiceResponse(CardServiceResponse {
                request_type: CardRequestType::CardPayment,
                application_sender: None,
                workstation_id: None,
                request_id: Some("17".to_string()),
                overall_result: OverallResult::Success,
                terminal: Some(Terminal {
                    terminal_id: "T-77".to_string(),
                    terminal_batch: None,
                    stan: Some("000123".to_string()),
                }),
                tender: Some(Tender {
                    total_amount: Some(TotalAmount::new(Decimal::new(1000, 3), "EUR")),
                    authorisation: Some(Authorisation {
                        acquirer_id: Some("ACQ1".to_string()),
                        card_pan: Some("4711********0001".to_string()),
                        card_circuit: Some("VISA".to_string()),
                        approval_code: None,
                    }),
                }),
            }),
            OpiMessage::DeviceRequest(DeviceRequest {
                request_type: DeviceRequestType::Output,
                application_sender: Some("EFT".to_string()),
                workstation_id: Some("POS1".to_string()),
                request_id: "900".to_string(),
                output: Some(Output {
                    target: DeviceTarget::EJournal,
                    text_lines: vec!["first".to_string(), "second".to_string()],
                }),
            }),
        ];

        for message in messages {
            let text = serialize(&message).unwrap();
            let back = deserialize(&text, message.kind()).unwrap();
            assert_eq!(back, message, "{text}");
        }
    }

    #[test]
    fn device_response_acknowledges_request() {
        let request = DeviceRequest {
            request_type: DeviceRequestType::Output,
            application_sender: None,
            workstation_id: None,
            request_id: "55".to_string(),
            output: Some(Output {
                target: DeviceTarget::CashierDisplay,
                text_lines: vec!["Karte einstecken".to_string()],
            }),
        };
        let ack = OpiMessage::DeviceResponse(crate::device::DeviceResponse::acknowledge(
            &request, "POS", "POS1",
        ));

        let text = serialize(&ack).unwrap();
        assert!(text.contains("RequestID=\"55\""));
        assert!(text.contains("OverallResult=\"Success\""));
        assert!(text.contains("OutDeviceTarget=\"CashierDisplay\""));
        assert_eq!(decode(&text).unwrap(), ack);
    }

    #[test]
    fn decodes_terminal_formatted_response() {
        let text = r#"<?xml version="1.0" encoding="UTF-8"?>
<CardServiceResponse xmlns="http://www.nrf-arts.org/IXRetail/namespace"
    RequestType="CardPayment" ApplicationSender="EFT" WorkstationID="POS1"
    RequestID="4" OverallResult="Aborted">
  <Terminal TerminalID="52000011" STAN="271"/>
</CardServiceResponse>"#;

        let message = decode(text).unwrap();
        assert_eq!(message.kind(), MessageKind::CardServiceResponse);
        assert_eq!(message.request_id(), Some("4"));
        assert_eq!(message.overall_result(), Some(OverallResult::Aborted));
        match message {
            OpiMessage::CardServiceResponse(response) => {
                let terminal = response.terminal.unwrap();
                assert_eq!(terminal.terminal_id, "52000011");
                assert_eq!(terminal.stan.as_deref(), Some("271"));
                assert!(response.tender.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn decodes_multi_line_device_output_in_order() {
        let text = r#"<DeviceRequest RequestType="Output" RequestID="8">
  <Output OutDeviceTarget="CashierDisplay">
    <TextLine>line 1</TextLine>
    <TextLine>line 2</TextLine>
    <TextLine>line 3</TextLine>
  </Output>
</DeviceRequest>"#;

        match decode(text).unwrap() {
            OpiMessage::DeviceRequest(request) => {
                let output = request.output.unwrap();
                assert_eq!(output.target, DeviceTarget::CashierDisplay);
                assert_eq!(output.text_lines, vec!["line 1", "line 2", "line 3"]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn response_without_request_id_still_decodes() {
        let text = r#"<ServiceResponse RequestType="Login" OverallResult="Success"/>"#;
        let message = decode(text).unwrap();
        assert_eq!(message.request_id(), None);
        assert_eq!(message.overall_result(), Some(OverallResult::Success));
    }

    #[test]
    fn expected_kind_mismatch_is_rejected() {
        let text = serialize(&payment_request()).unwrap();
        let err = deserialize(&text, MessageKind::ServiceRequest).unwrap_err();
        assert!(matches!(
            err,
            MessageError::UnexpectedKind {
                expected: MessageKind::ServiceRequest,
                actual: MessageKind::CardServiceRequest,
                ..
            }
        ));
        assert_eq!(err.raw(), Some(text.as_str()));
    }

    #[test]
    fn malformed_body_keeps_raw_text() {
        let missing_result = r#"<CardServiceResponse RequestType="CardPayment" RequestID="1"/>"#;
        let err = decode(missing_result).unwrap_err();
        assert!(matches!(err, MessageError::Malformed { .. }));
        assert_eq!(err.raw(), Some(missing_result));

        let unknown_result =
            r#"<ServiceResponse RequestType="Login" RequestID="1" OverallResult="Maybe"/>"#;
        assert!(matches!(
            decode(unknown_result),
            Err(MessageError::Malformed { .. })
        ));

        let bad_amount = r#"<CardServiceRequest RequestType="CardPayment" ApplicationSender="POS"
            WorkstationID="POS1" RequestID="1"><POSdata><POSTimeStamp>t</POSTimeStamp></POSdata>
            <TotalAmount Currency="EUR">ten</TotalAmount></CardServiceRequest>"#;
        assert!(matches!(
            decode(bad_amount),
            Err(MessageError::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_root_is_reported() {
        let err = decode("<PosHeartbeat/>").unwrap_err();
        assert!(matches!(err, MessageError::UnknownKind { .. }));
    }
}
