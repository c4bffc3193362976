//! Text-frame codec for the bridge protocol.
//!
//! One JSON envelope per WebSocket text frame; no additional framing.

use crate::error::{BridgeError, BridgeResult};
use crate::messages::{ClientMessage, ServerMessage};

/// Decode one inbound text frame into a typed envelope.
pub fn decode_client(text: &str) -> BridgeResult<ClientMessage> {
    serde_json::from_str(text).map_err(|e| BridgeError::Protocol(e.to_string()))
}

/// Encode one outbound envelope as a text frame.
pub fn encode_server(msg: &ServerMessage) -> BridgeResult<String> {
    serde_json::to_string(msg).map_err(|e| BridgeError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_envelopes() {
        let msg = decode_client(r#"{"type":"input","data":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Input { data: "abc".into() });
    }

    #[test]
    fn malformed_json_is_a_protocol_error() {
        let err = decode_client("not json").unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn known_type_with_missing_fields_is_a_protocol_error() {
        // `resize` without cols/rows is malformed, not unknown.
        let err = decode_client(r#"{"type":"resize"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn encodes_output_envelope() {
        let json = encode_server(&ServerMessage::Output { data: "hi\r\n".into() }).unwrap();
        assert_eq!(json, r#"{"type":"output","data":"hi\r\n"}"#);
    }
}
