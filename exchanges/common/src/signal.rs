//! Connection-setup signals carried inside relay frames.
//!
//! On the wire a signal is `{"type": <kind>, "payload": <object>}`. The set
//! of kinds is closed and every payload is bounded; [`Signal::decode`] is
//! the only way in, so a `Signal` value is always valid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::limits::{
    MAX_CANDIDATE_LEN, MAX_ERROR_CODE_LEN, MAX_ERROR_MESSAGE_LEN,
    MAX_SDP_LEN, char_len,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    try_from = "Value"
)]
pub enum Signal {
    /// The peer is present and wants to start negotiating.
    Ready,
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    Cancel {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("signal must be a JSON object")]
    NotAnObject,
    #[error("signal is missing a string 'type'")]
    MissingType,
    #[error("unknown signal type '{0}'")]
    UnknownType(String),
    #[error("'{0}' signal requires an object payload")]
    MissingPayload(&'static str),
    #[error("signal payload is missing '{0}'")]
    MissingField(&'static str),
    #[error("signal field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("signal field '{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

impl Signal {
    /// Validates an untrusted JSON value into a signal.
    pub fn decode(value: &Value) -> Result<Signal, SignalError> {
        let object = value.as_object().ok_or(SignalError::NotAnObject)?;
        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SignalError::MissingType)?;
        let payload = object.get("payload").filter(|p| !p.is_null());

        match kind {
            "ready" => Ok(Signal::Ready),
            "offer" => {
                let payload = require_payload("offer", payload)?;
                Ok(Signal::Offer(SessionDescription {
                    sdp: required_str(payload, "sdp", MAX_SDP_LEN)?,
                }))
            }
            "answer" => {
                let payload = require_payload("answer", payload)?;
                Ok(Signal::Answer(SessionDescription {
                    sdp: required_str(payload, "sdp", MAX_SDP_LEN)?,
                }))
            }
            "ice-candidate" => {
                let payload = require_payload("ice-candidate", payload)?;
                Ok(Signal::IceCandidate(IceCandidate {
                    candidate: required_str(
                        payload,
                        "candidate",
                        MAX_CANDIDATE_LEN,
                    )?,
                    sdp_mid: optional_str(payload, "sdpMid", None)?,
                    sdp_m_line_index: optional_index(payload)?,
                    username_fragment: optional_str(
                        payload,
                        "usernameFragment",
                        None,
                    )?,
                }))
            }
            "cancel" => {
                let reason = match payload {
                    None => None,
                    Some(p) => {
                        let p = p.as_object().ok_or(
                            SignalError::WrongType {
                                field: "payload",
                                expected: "an object",
                            },
                        )?;
                        optional_str(p, "reason", Some(MAX_ERROR_MESSAGE_LEN))?
                    }
                };
                Ok(Signal::Cancel { reason })
            }
            "error" => {
                let payload = require_payload("error", payload)?;
                Ok(Signal::Error {
                    code: required_str(payload, "code", MAX_ERROR_CODE_LEN)?,
                    message: required_str(
                        payload,
                        "message",
                        MAX_ERROR_MESSAGE_LEN,
                    )?,
                })
            }
            other => Err(SignalError::UnknownType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Ready => "ready",
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::IceCandidate(_) => "ice-candidate",
            Signal::Cancel { .. } => "cancel",
            Signal::Error { .. } => "error",
        }
    }
}

impl TryFrom<Value> for Signal {
    type Error = SignalError;

    fn try_from(value: Value) -> Result<Self, SignalError> {
        Signal::decode(&value)
    }
}

fn require_payload<'a>(
    kind: &'static str,
    payload: Option<&'a Value>,
) -> Result<&'a Map<String, Value>, SignalError> {
    payload
        .and_then(Value::as_object)
        .ok_or(SignalError::MissingPayload(kind))
}

fn required_str(
    payload: &Map<String, Value>,
    field: &'static str,
    max: usize,
) -> Result<String, SignalError> {
    match payload.get(field) {
        None | Some(Value::Null) => Err(SignalError::MissingField(field)),
        Some(value) => bounded_str(value, field, Some(max)),
    }
}

fn optional_str(
    payload: &Map<String, Value>,
    field: &'static str,
    max: Option<usize>,
) -> Result<Option<String>, SignalError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => bounded_str(value, field, max).map(Some),
    }
}

fn bounded_str(
    value: &Value,
    field: &'static str,
    max: Option<usize>,
) -> Result<String, SignalError> {
    let s = value.as_str().ok_or(SignalError::WrongType {
        field,
        expected: "a string",
    })?;
    match max {
        Some(max) if char_len(s) > max => {
            Err(SignalError::TooLong { field, max })
        }
        _ => Ok(s.to_string()),
    }
}

fn optional_index(
    payload: &Map<String, Value>,
) -> Result<Option<u16>, SignalError> {
    match payload.get("sdpMLineIndex") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or(SignalError::WrongType {
                field: "sdpMLineIndex",
                expected: "a small non-negative integer",
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sdp_length_is_counted_in_characters() {
        let at_limit = "é".repeat(MAX_SDP_LEN);
        let signal =
            Signal::decode(&json!({"type": "offer", "payload": {"sdp": at_limit}}))
                .unwrap();
        assert_eq!(signal.kind(), "offer");

        let over = "a".repeat(MAX_SDP_LEN + 1);
        assert_eq!(
            Signal::decode(&json!({"type": "answer", "payload": {"sdp": over}})),
            Err(SignalError::TooLong {
                field: "sdp",
                max: MAX_SDP_LEN
            })
        );
    }

    #[test]
    fn test_candidate_extras_are_carried_through() {
        let signal = Signal::decode(&json!({
            "type": "ice-candidate",
            "payload": {
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0,
                "usernameFragment": "abcd"
            }
        }))
        .unwrap();
        let Signal::IceCandidate(candidate) = &signal else {
            panic!("expected candidate, got {signal:?}");
        };
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));

        let wire = serde_json::to_value(&signal).unwrap();
        assert_eq!(wire["payload"]["sdpMLineIndex"], 0);
        assert_eq!(wire["type"], "ice-candidate");
    }

    #[test]
    fn test_cancel_reason_is_optional_and_bounded() {
        assert_eq!(
            Signal::decode(&json!({"type": "cancel"})).unwrap(),
            Signal::Cancel { reason: None }
        );
        assert_eq!(
            Signal::decode(&json!({"type": "cancel", "payload": {"reason": "bye"}}))
                .unwrap(),
            Signal::Cancel {
                reason: Some("bye".into())
            }
        );
        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 1);
        assert!(
            Signal::decode(&json!({"type": "cancel", "payload": {"reason": long}}))
                .is_err()
        );
    }

    #[test]
    fn test_rejects_malformed_signals() {
        for value in [
            json!("offer"),
            json!({"payload": {}}),
            json!({"type": "renegotiate"}),
            json!({"type": "offer"}),
            json!({"type": "offer", "payload": {"sdp": 42}}),
            json!({"type": "ice-candidate", "payload": {"sdpMid": "0"}}),
            json!({"type": "ice-candidate", "payload": {"candidate": "c", "sdpMLineIndex": -1}}),
            json!({"type": "error", "payload": {"code": "x"}}),
        ] {
            assert!(Signal::decode(&value).is_err(), "{value}");
        }
    }

    #[test]
    fn test_deserialize_goes_through_decoder() {
        let ok: Signal =
            serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ok, Signal::Ready);
        let too_long = format!(
            r#"{{"type":"ice-candidate","payload":{{"candidate":"{}"}}}}"#,
            "c".repeat(MAX_CANDIDATE_LEN + 1)
        );
        assert!(serde_json::from_str::<Signal>(&too_long).is_err());
    }

    #[test]
    fn test_try_from_value() {
        let signal = Signal::try_from(json!({
            "type": "error",
            "payload": {"code": "ice-failed", "message": "no route"}
        }))
        .unwrap();
        assert_eq!(signal.kind(), "error");
        assert_eq!(
            Signal::try_from(json!("ready")),
            Err(SignalError::NotAnObject)
        );
    }
}
