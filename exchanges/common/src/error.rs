use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes the relay reports in `error` frames.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    InvalidFrame,
    UnknownType,
    InvalidTransferId,
    InvalidRole,
    InvalidToken,
    InvalidSignal,
    RoleTaken,
    AuthMismatch,
    NotJoined,
    MissingRoom,
    PeerMissing,
    RoomExpired,
    RateLimited,
    MessageTooLarge,
}

/// Coarse grouping of [`ErrorCode`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Protocol,
    Authorization,
    Resource,
    Abuse,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidFrame => "invalid-frame",
            ErrorCode::UnknownType => "unknown-type",
            ErrorCode::InvalidTransferId => "invalid-transfer-id",
            ErrorCode::InvalidRole => "invalid-role",
            ErrorCode::InvalidToken => "invalid-token",
            ErrorCode::InvalidSignal => "invalid-signal",
            ErrorCode::RoleTaken => "role-taken",
            ErrorCode::AuthMismatch => "auth-mismatch",
            ErrorCode::NotJoined => "not-joined",
            ErrorCode::MissingRoom => "missing-room",
            ErrorCode::PeerMissing => "peer-missing",
            ErrorCode::RoomExpired => "room-expired",
            ErrorCode::RateLimited => "rate-limited",
            ErrorCode::MessageTooLarge => "message-too-large",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            ErrorCode::InvalidFrame
            | ErrorCode::UnknownType
            | ErrorCode::InvalidTransferId
            | ErrorCode::InvalidRole
            | ErrorCode::InvalidToken
            | ErrorCode::InvalidSignal => ErrorClass::Protocol,
            ErrorCode::RoleTaken
            | ErrorCode::AuthMismatch
            | ErrorCode::NotJoined => ErrorClass::Authorization,
            ErrorCode::MissingRoom
            | ErrorCode::PeerMissing
            | ErrorCode::RoomExpired => ErrorClass::Resource,
            ErrorCode::RateLimited | ErrorCode::MessageTooLarge => {
                ErrorClass::Abuse
            }
        }
    }

    /// Whether the relay closes the connection after reporting this code.
    ///
    /// Protocol errors only end the connection when the offending frame was
    /// a `join-room`.
    pub fn closes_connection(self, during_join: bool) -> bool {
        match self.class() {
            ErrorClass::Protocol => during_join,
            ErrorClass::Authorization => self == ErrorCode::RoleTaken,
            ErrorClass::Resource => self == ErrorCode::RoomExpired,
            ErrorClass::Abuse => true,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected inbound frame: the code to report, a human-readable detail,
/// and whether the frame was a `join-room`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct FrameError {
    pub code: ErrorCode,
    pub message: String,
    pub during_join: bool,
}

impl FrameError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            during_join: false,
        }
    }

    pub fn in_join(mut self) -> Self {
        self.during_join = true;
        self
    }

    pub fn closes_connection(&self) -> bool {
        self.code.closes_connection(self.during_join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_name_matches_as_str() {
        for code in [
            ErrorCode::InvalidFrame,
            ErrorCode::InvalidTransferId,
            ErrorCode::AuthMismatch,
            ErrorCode::RoomExpired,
            ErrorCode::MessageTooLarge,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }

    #[test]
    fn test_terminal_codes() {
        assert!(ErrorCode::InvalidRole.closes_connection(true));
        assert!(!ErrorCode::InvalidSignal.closes_connection(false));
        assert!(ErrorCode::RoleTaken.closes_connection(false));
        assert!(!ErrorCode::AuthMismatch.closes_connection(false));
        assert!(!ErrorCode::PeerMissing.closes_connection(false));
        assert!(ErrorCode::RoomExpired.closes_connection(false));
        assert!(ErrorCode::RateLimited.closes_connection(false));
        assert!(ErrorCode::MessageTooLarge.closes_connection(false));
    }
}
