//! The ephemeral transfer session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TransferCode;

/// Lifecycle state of a session.
///
/// Only `Created`, `Joined` and `Closed` are ever stored. `Expired` is
/// computed on read from `expires_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Joined,
    Closed,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSession {
    pub transfer_id: String,
    pub transfer_code: TransferCode,
    pub sender_token: String,
    /// Present iff the stored state is `Joined`.
    pub receiver_token: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TransferSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// State as observed at `now`, with expiry applied.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_expired_at(now) {
            SessionState::Expired
        } else {
            self.state
        }
    }

    /// Returns the record with its state reclassified for `now`.
    pub fn observed_at(mut self, now: DateTime<Utc>) -> Self {
        self.state = self.state_at(now);
        self
    }

    /// The join guard: no receiver yet, still created and not expired.
    pub fn is_joinable_at(&self, now: DateTime<Utc>) -> bool {
        self.receiver_token.is_none()
            && self.state == SessionState::Created
            && self.expires_at > now
    }
}
