use peerdrop_entities::InvalidTransferCode;
use thiserror::Error;

/// Typed failures of the session store, surfaced verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no session matches this code")]
    NotFound,
    #[error("the session has expired")]
    Expired,
    #[error("the session already has a receiver")]
    AlreadyJoined,
    #[error(transparent)]
    InvalidCode(#[from] InvalidTransferCode),
    #[error("could not allocate a unique transfer code after {0} attempts")]
    CouldNotAllocate(u32),
    #[error("the token does not match this session")]
    Forbidden,
    #[error("the session has not been joined")]
    NotJoined,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("session repository failure: {0}")]
    Repository(String),
}

impl SessionError {
    /// Stable wire reason used by the HTTP API.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::NotFound => "not-found",
            SessionError::Expired => "expired",
            SessionError::AlreadyJoined => "already-joined",
            SessionError::InvalidCode(_) => "invalid-code",
            SessionError::CouldNotAllocate(_) => "could-not-allocate",
            SessionError::Forbidden => "forbidden",
            SessionError::NotJoined => "not-joined",
            SessionError::InvalidRequest(_) => "invalid-request",
            SessionError::Repository(_) => "internal",
        }
    }

    /// Rebuilds a typed error from a wire reason and message.
    pub fn from_reason(reason: &str, message: &str) -> Self {
        match reason {
            "not-found" => SessionError::NotFound,
            "expired" => SessionError::Expired,
            "already-joined" => SessionError::AlreadyJoined,
            "invalid-code" => SessionError::InvalidCode(InvalidTransferCode(
                message.to_string(),
            )),
            "could-not-allocate" => SessionError::CouldNotAllocate(0),
            "forbidden" => SessionError::Forbidden,
            "not-joined" => SessionError::NotJoined,
            "invalid-request" => {
                SessionError::InvalidRequest(message.to_string())
            }
            _ => SessionError::Repository(message.to_string()),
        }
    }
}

/// Failures reported by a [`crate::SessionRepository`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("transfer code is already in use")]
    CodeTaken,
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<RepositoryError> for SessionError {
    fn from(err: RepositoryError) -> Self {
        SessionError::Repository(err.to_string())
    }
}
