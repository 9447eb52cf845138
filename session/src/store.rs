use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use peerdrop_entities::{
    InvalidTransferCode, SessionState, TransferCode, TransferSession,
};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RepositoryError, SessionError, SessionRepository};

/// Characters used for generated codes. Look-alikes (0/O, 1/I) are left out,
/// so generation covers a subset of the `[A-Z0-9]` codes that join accepts.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const TOKEN_BYTES: usize = 24;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces candidate transfer codes. Uniqueness is enforced by the
/// repository, not by the generator.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> Result<TransferCode, InvalidTransferCode>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomCodeGenerator;

impl RandomCodeGenerator {
    fn group(rng: &mut impl Rng) -> String {
        (0..TransferCode::GROUP_LEN)
            .map(|_| {
                CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char
            })
            .collect()
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> Result<TransferCode, InvalidTransferCode> {
        let mut rng = rand::rng();
        let first = Self::group(&mut rng);
        let second = Self::group(&mut rng);
        TransferCode::from_groups(&first, &second)
    }
}

/// TTL bounds and allocation policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStoreConfig {
    pub min_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
    pub default_ttl_minutes: i64,
    pub max_code_attempts: u32,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            min_ttl_minutes: 10,
            max_ttl_minutes: 30,
            default_ttl_minutes: 15,
            max_code_attempts: 5,
        }
    }
}

impl SessionStoreConfig {
    /// Applies the default and clamps into `[min, max]`.
    pub fn clamp_ttl(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_ttl_minutes)
            .clamp(self.min_ttl_minutes, self.max_ttl_minutes)
    }
}

#[derive(Clone, Debug)]
pub struct CreatedSession {
    pub session: TransferSession,
    pub sender_token: String,
}

#[derive(Clone, Debug)]
pub struct JoinedSession {
    pub session: TransferSession,
    pub receiver_token: String,
}

/// Issues and validates ephemeral transfer sessions.
#[derive(Clone)]
pub struct SessionStore {
    repository: Arc<dyn SessionRepository>,
    config: SessionStoreConfig,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        Self::with_config(repository, SessionStoreConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn SessionRepository>,
        config: SessionStoreConfig,
    ) -> Self {
        Self {
            repository,
            config,
            clock: Arc::new(SystemClock),
            codes: Arc::new(RandomCodeGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    pub async fn create(
        &self,
        ttl_minutes: Option<i64>,
    ) -> Result<CreatedSession, SessionError> {
        let ttl = self.config.clamp_ttl(ttl_minutes);
        let now = self.clock.now();
        let sender_token = mint_token();

        for attempt in 1..=self.config.max_code_attempts {
            let session = TransferSession {
                transfer_id: Uuid::new_v4().to_string(),
                transfer_code: self.codes.generate()?,
                sender_token: sender_token.clone(),
                receiver_token: None,
                state: SessionState::Created,
                created_at: now,
                expires_at: now + Duration::minutes(ttl),
            };
            match self.repository.insert(session.clone()).await {
                Ok(()) => {
                    info!(
                        "Created session {} (code {}, ttl {}m)",
                        session.transfer_id, session.transfer_code, ttl
                    );
                    return Ok(CreatedSession {
                        session,
                        sender_token,
                    });
                }
                Err(RepositoryError::CodeTaken) => {
                    debug!("Code collision on attempt {}", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Gave up allocating a transfer code after {} attempts",
            self.config.max_code_attempts
        );
        Err(SessionError::CouldNotAllocate(self.config.max_code_attempts))
    }

    pub async fn join(
        &self,
        code: &str,
    ) -> Result<JoinedSession, SessionError> {
        let code = TransferCode::parse(code)?;
        let now = self.clock.now();
        let receiver_token = mint_token();

        let joined = self
            .repository
            .join_if_open(&code, receiver_token.clone(), now)
            .await?;
        if let Some(session) = joined {
            info!("Session {} joined", session.transfer_id);
            return Ok(JoinedSession {
                session: session.observed_at(now),
                receiver_token,
            });
        }

        match self.repository.find_by_code(&code).await? {
            None => Err(SessionError::NotFound),
            Some(session) if session.is_expired_at(now) => {
                Err(SessionError::Expired)
            }
            Some(_) => Err(SessionError::AlreadyJoined),
        }
    }

    pub async fn get(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransferSession>, SessionError> {
        let now = self.clock.now();
        Ok(self
            .repository
            .find_by_id(transfer_id)
            .await?
            .map(|s| s.observed_at(now)))
    }

    pub async fn get_by_code(
        &self,
        code: &str,
    ) -> Result<Option<TransferSession>, SessionError> {
        let code = TransferCode::parse(code)?;
        let now = self.clock.now();
        Ok(self
            .repository
            .find_by_code(&code)
            .await?
            .map(|s| s.observed_at(now)))
    }

    /// Marks a joined session closed. Only the sender may close.
    pub async fn close(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<TransferSession, SessionError> {
        let now = self.clock.now();
        if let Some(session) = self
            .repository
            .close_if_joined(transfer_id, sender_token)
            .await?
        {
            info!("Session {} closed", transfer_id);
            return Ok(session.observed_at(now));
        }

        match self.repository.find_by_id(transfer_id).await? {
            None => Err(SessionError::NotFound),
            Some(s) if s.sender_token != sender_token => {
                Err(SessionError::Forbidden)
            }
            Some(s) if s.is_expired_at(now) => Err(SessionError::Expired),
            Some(_) => Err(SessionError::NotJoined),
        }
    }
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
