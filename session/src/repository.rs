//! Storage seam for transfer sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerdrop_entities::{SessionState, TransferCode, TransferSession};
use tokio::sync::Mutex;

use crate::RepositoryError;

/// Persistence contract for transfer sessions.
///
/// `join_if_open` and `close_if_joined` are conditional updates: they must
/// check their guard and apply the change atomically with respect to every
/// other caller, including callers in other processes when the backend is
/// shared. Plain read-then-write does not satisfy this contract.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Stores a new session. Fails with [`RepositoryError::CodeTaken`] when
    /// another session already uses the same code.
    async fn insert(
        &self,
        session: TransferSession,
    ) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferSession>, RepositoryError>;

    async fn find_by_code(
        &self,
        code: &TransferCode,
    ) -> Result<Option<TransferSession>, RepositoryError>;

    /// Sets the receiver token and moves the session to `joined` iff
    /// `receiver_token IS NULL AND state = created AND expires_at > now`.
    /// Returns the updated record, or `None` when the guard did not hold.
    async fn join_if_open(
        &self,
        code: &TransferCode,
        receiver_token: String,
        now: DateTime<Utc>,
    ) -> Result<Option<TransferSession>, RepositoryError>;

    /// Moves the session to `closed` iff it is `joined` and `sender_token`
    /// matches. Clears the receiver token.
    async fn close_if_joined(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<Option<TransferSession>, RepositoryError>;
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, TransferSession>,
    codes: HashMap<TransferCode, String>,
}

/// Process-local repository. The whole table sits behind one async mutex,
/// which makes every conditional update atomic within the process.
#[derive(Default)]
pub struct InMemorySessionRepository {
    tables: Mutex<Tables>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(
        &self,
        session: TransferSession,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.codes.contains_key(&session.transfer_code) {
            return Err(RepositoryError::CodeTaken);
        }
        if tables.sessions.contains_key(&session.transfer_id) {
            return Err(RepositoryError::Backend(format!(
                "duplicate transfer id {}",
                session.transfer_id
            )));
        }
        tables
            .codes
            .insert(session.transfer_code.clone(), session.transfer_id.clone());
        tables
            .sessions
            .insert(session.transfer_id.clone(), session);
        Ok(())
    }

    async fn find_by_id(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferSession>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .await
            .sessions
            .get(transfer_id)
            .cloned())
    }

    async fn find_by_code(
        &self,
        code: &TransferCode,
    ) -> Result<Option<TransferSession>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    async fn join_if_open(
        &self,
        code: &TransferCode,
        receiver_token: String,
        now: DateTime<Utc>,
    ) -> Result<Option<TransferSession>, RepositoryError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;
        let Some(id) = tables.codes.get(code) else {
            return Ok(None);
        };
        let Some(session) = tables.sessions.get_mut(id) else {
            return Ok(None);
        };
        if !session.is_joinable_at(now) {
            return Ok(None);
        }
        session.receiver_token = Some(receiver_token);
        session.state = SessionState::Joined;
        Ok(Some(session.clone()))
    }

    async fn close_if_joined(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<Option<TransferSession>, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.sessions.get_mut(transfer_id) else {
            return Ok(None);
        };
        if session.state != SessionState::Joined
            || session.sender_token != sender_token
        {
            return Ok(None);
        }
        session.receiver_token = None;
        session.state = SessionState::Closed;
        Ok(Some(session.clone()))
    }
}
