//! JSON shapes of the session HTTP API.
//!
//! The relay server produces these and the orchestrator's HTTP client
//! consumes them. Session views never carry tokens; each token is returned
//! once, to the party it belongs to.

use chrono::{DateTime, Utc};
use peerdrop_entities::{SessionState, TransferCode, TransferSession};
use serde::{Deserialize, Serialize};

use crate::SessionError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_minutes: Option<f64>,
}

impl CreateSessionRequest {
    /// Parses a create body. An empty body asks for the default TTL.
    pub fn parse(body: &[u8]) -> Result<Self, SessionError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| SessionError::InvalidRequest(e.to_string()))
    }

    /// The requested TTL in whole minutes, fraction dropped. The store
    /// clamps the result.
    pub fn whole_minutes(&self) -> Option<i64> {
        self.ttl_minutes
            .filter(|minutes| minutes.is_finite())
            .map(|minutes| minutes.floor() as i64)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionRequest {
    pub transfer_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseSessionRequest {
    pub sender_token: String,
}

/// Public view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub transfer_id: String,
    pub transfer_code: TransferCode,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
}

impl From<&TransferSession> for SessionView {
    fn from(session: &TransferSession) -> Self {
        Self {
            transfer_id: session.transfer_id.clone(),
            transfer_code: session.transfer_code.clone(),
            expires_at: session.expires_at,
            state: session.state,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session: SessionView,
    pub sender_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSessionResponse {
    pub success: bool,
    pub session: SessionView,
    pub receiver_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub success: bool,
    pub session: SessionView,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl From<&SessionError> for ErrorResponse {
    fn from(err: &SessionError) -> Self {
        Self {
            success: false,
            error: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<ErrorResponse> for SessionError {
    fn from(response: ErrorResponse) -> Self {
        SessionError::from_reason(&response.error, &response.message)
    }
}
