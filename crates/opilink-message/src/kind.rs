use std::fmt;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{MessageError, Result};

/// The six OPI message kinds, named after their root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ServiceRequest,
    ServiceResponse,
    CardServiceRequest,
    CardServiceResponse,
    DeviceRequest,
    DeviceResponse,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::ServiceRequest,
        MessageKind::ServiceResponse,
        MessageKind::CardServiceRequest,
        MessageKind::CardServiceResponse,
        MessageKind::DeviceRequest,
        MessageKind::DeviceResponse,
    ];

    /// Root element name on the wire.
    pub fn element_name(self) -> &'static str {
        match self {
            MessageKind::ServiceRequest => "ServiceRequest",
            MessageKind::ServiceResponse => "ServiceResponse",
            MessageKind::CardServiceRequest => "CardServiceRequest",
            MessageKind::CardServiceResponse => "CardServiceResponse",
            MessageKind::DeviceRequest => "DeviceRequest",
            MessageKind::DeviceResponse => "DeviceResponse",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.element_name() == name)
    }

    /// Responses end an exchange; requests open one.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            MessageKind::ServiceResponse
                | MessageKind::CardServiceResponse
                | MessageKind::DeviceResponse
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// Determine the message kind from the first element of `text`.
///
/// Only the root start tag is read; the body is not validated here.
pub fn sniff_kind(text: &str) -> Result<MessageKind> {
    let mut reader = Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                let local = element.local_name();
                let name = String::from_utf8_lossy(local.as_ref()).into_owned();
                return MessageKind::from_element_name(&name).ok_or_else(|| {
                    MessageError::UnknownKind {
                        element: name,
                        raw: text.to_owned(),
                    }
                });
            }
            Ok(Event::Eof) => {
                return Err(MessageError::Malformed {
                    reason: "no root element".to_string(),
                    raw: text.to_owned(),
                });
            }
            Ok(_) => continue,
            Err(err) => {
                return Err(MessageError::Malformed {
                    reason: err.to_string(),
                    raw: text.to_owned(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_root_after_declaration_and_comments() {
        let text = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- terminal -->\n\
                    <CardServiceResponse RequestID=\"3\" OverallResult=\"Success\"></CardServiceResponse>";
        assert_eq!(sniff_kind(text).unwrap(), MessageKind::CardServiceResponse);
    }

    #[test]
    fn sniffs_empty_root_element() {
        assert_eq!(
            sniff_kind("<ServiceResponse RequestID=\"1\"/>").unwrap(),
            MessageKind::ServiceResponse
        );
    }

    #[test]
    fn ignores_namespace_prefix() {
        let text = "<opi:DeviceRequest xmlns:opi=\"http://www.nrf-arts.org/IXRetail/namespace\"/>";
        assert_eq!(sniff_kind(text).unwrap(), MessageKind::DeviceRequest);
    }

    #[test]
    fn unknown_root_keeps_raw_text() {
        let err = sniff_kind("<Heartbeat/>").unwrap_err();
        assert!(matches!(err, MessageError::UnknownKind { ref element, .. } if element == "Heartbeat"));
        assert_eq!(err.raw(), Some("<Heartbeat/>"));
    }

    #[test]
    fn empty_and_garbage_input_is_malformed() {
        assert!(matches!(
            sniff_kind(""),
            Err(MessageError::Malformed { .. })
        ));
        assert!(matches!(
            sniff_kind("not xml at all"),
            Err(MessageError::Malformed { .. })
        ));
    }

    #[test]
    fn element_names_roundtrip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_element_name(kind.element_name()), Some(kind));
        }
        assert!(MessageKind::CardServiceResponse.is_response());
        assert!(!MessageKind::DeviceRequest.is_response());
    }
}
