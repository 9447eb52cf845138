use serde::{Deserialize, Serialize};

/// Text frames exchanged on the data channel around the binary chunks.
///
/// A transfer is `meta`, then the file bytes as binary frames, then `done`.
/// Either side may send `cancel` at any point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    Meta {
        name: String,
        mime_type: String,
        size: u64,
    },
    Done,
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ControlMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<ControlMessage, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_wire_shape() {
        let meta = ControlMessage::Meta {
            name: "photo.png".into(),
            mime_type: "image/png".into(),
            size: 150_000,
        };
        let value: serde_json::Value =
            serde_json::from_str(&meta.encode().unwrap()).unwrap();
        assert_eq!(value["kind"], "meta");
        assert_eq!(value["mimeType"], "image/png");
        assert_eq!(value["size"], 150_000);
    }

    #[test]
    fn test_decode_done_and_bare_cancel() {
        assert_eq!(
            ControlMessage::decode(r#"{"kind":"done"}"#).unwrap(),
            ControlMessage::Done
        );
        assert_eq!(
            ControlMessage::decode(r#"{"kind":"cancel"}"#).unwrap(),
            ControlMessage::Cancel { reason: None }
        );
        assert!(ControlMessage::decode(r#"{"kind":"pause"}"#).is_err());
    }
}
