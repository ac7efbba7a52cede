use serde::{Deserialize, Serialize};

/// The wire envelope exchanged between peers, one JSON object per line:
/// `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeerMessage {
    /// A list of peer addresses the sender knows about. The receiver dials
    /// each one and answers with its own address.
    #[serde(rename = "TYPE_HANDSHAKE")]
    Handshake(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_wire_format() {
        let message = PeerMessage::Handshake(vec!["127.0.0.1:3000".to_string()]);
        let encoded = serde_json::to_string(&message).unwrap();

        assert_eq!(
            encoded,
            r#"{"type":"TYPE_HANDSHAKE","data":["127.0.0.1:3000"]}"#
        );

        let decoded: PeerMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<PeerMessage>(r#"{"type":"TYPE_BOGUS","data":[]}"#);
        assert!(result.is_err());
    }
}
