//! Relay frames.

use peerdrop_entities::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    ErrorCode, FrameError, Signal,
    limits::{MAX_TOKEN_LEN, MAX_TRANSFER_ID_LEN, char_len},
};

/// Frames a client sends to the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        transfer_id: String,
        role: Role,
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    Relay {
        transfer_id: String,
        role: Role,
        token: String,
        signal: Signal,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        transfer_id: String,
        role: Role,
        token: String,
    },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A client frame as the relay receives it.
///
/// Credentials stay raw strings here: a `join-room` is validated with
/// [`JoinRequest::validate`], while `relay` and `leave-room` envelopes are
/// compared against the connection's join-time binding. The relayed signal
/// is kept as JSON until the credential check has passed.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientFrame {
    JoinRoom {
        transfer_id: String,
        role: String,
        token: String,
    },
    Relay {
        transfer_id: String,
        role: String,
        token: String,
        signal: Value,
    },
    LeaveRoom {
        transfer_id: String,
        role: String,
        token: String,
    },
}

impl ClientFrame {
    pub fn decode(text: &str) -> Result<ClientFrame, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            FrameError::new(ErrorCode::InvalidFrame, format!("not JSON: {e}"))
        })?;
        let object = value.as_object().ok_or_else(|| {
            FrameError::new(ErrorCode::InvalidFrame, "frame must be an object")
        })?;
        let kind = object.get("type").and_then(Value::as_str).ok_or_else(
            || FrameError::new(ErrorCode::InvalidFrame, "missing frame type"),
        )?;

        match kind {
            "join-room" => Ok(ClientFrame::JoinRoom {
                transfer_id: field(object, "transferId")
                    .map_err(FrameError::in_join)?,
                role: field(object, "role").map_err(FrameError::in_join)?,
                token: field(object, "token").map_err(FrameError::in_join)?,
            }),
            "relay" => Ok(ClientFrame::Relay {
                transfer_id: field(object, "transferId")?,
                role: field(object, "role")?,
                token: field(object, "token")?,
                signal: object.get("signal").cloned().ok_or_else(|| {
                    FrameError::new(
                        ErrorCode::InvalidFrame,
                        "missing field 'signal'",
                    )
                })?,
            }),
            "leave-room" => Ok(ClientFrame::LeaveRoom {
                transfer_id: field(object, "transferId")?,
                role: field(object, "role")?,
                token: field(object, "token")?,
            }),
            other => Err(FrameError::new(
                ErrorCode::UnknownType,
                format!("unknown frame type '{other}'"),
            )),
        }
    }
}

fn field(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<String, FrameError> {
    object
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            FrameError::new(
                ErrorCode::InvalidFrame,
                format!("missing string field '{name}'"),
            )
        })
}

/// A `join-room` request whose credentials passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinRequest {
    pub transfer_id: String,
    pub role: Role,
    pub token: String,
}

impl JoinRequest {
    pub fn validate(
        transfer_id: &str,
        role: &str,
        token: &str,
    ) -> Result<JoinRequest, FrameError> {
        if transfer_id.is_empty()
            || char_len(transfer_id) > MAX_TRANSFER_ID_LEN
        {
            return Err(FrameError::new(
                ErrorCode::InvalidTransferId,
                format!(
                    "transferId must be 1..={MAX_TRANSFER_ID_LEN} characters"
                ),
            )
            .in_join());
        }
        let role: Role = role.parse().map_err(|e| {
            FrameError::new(ErrorCode::InvalidRole, format!("{e}")).in_join()
        })?;
        if token.is_empty() || char_len(token) > MAX_TOKEN_LEN {
            return Err(FrameError::new(
                ErrorCode::InvalidToken,
                format!("token must be 1..={MAX_TOKEN_LEN} characters"),
            )
            .in_join());
        }
        Ok(JoinRequest {
            transfer_id: transfer_id.to_string(),
            role,
            token: token.to_string(),
        })
    }
}

/// Frames the relay sends to a client. `role` is always the recipient's
/// own role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    JoinedRoom { role: Role, peer_present: bool },
    #[serde(rename_all = "camelCase")]
    PeerJoined { role: Role, peer_role: Role },
    #[serde(rename_all = "camelCase")]
    PeerLeft { role: Role, peer_role: Role },
    Relay {
        role: Role,
        from: Role,
        signal: Signal,
    },
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<ServerMessage, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<&FrameError> for ServerMessage {
    fn from(err: &FrameError) -> Self {
        ServerMessage::error(err.code, err.message.clone())
    }
}
