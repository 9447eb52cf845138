//! Session store for PeerDrop transfers.
//!
//! A transfer session is the short-lived record two peers use to find each
//! other: the sender creates it and shares the `XXXX-XXXX` code, the receiver
//! joins it exactly once. Each side gets a bearer token it later presents to
//! the signaling relay.
//!
//! Storage goes through the [`SessionRepository`] trait whose `join_if_open`
//! must be an atomic compare-and-set. [`InMemorySessionRepository`] is the
//! single-process implementation; a transactional backend can provide the
//! same contract with a conditional update.
//!
//! ```rust
//! use std::sync::Arc;
//! use peerdrop_session::{InMemorySessionRepository, SessionError, SessionStore};
//!
//! # async fn demo() -> Result<(), SessionError> {
//! let store = SessionStore::new(Arc::new(InMemorySessionRepository::new()));
//! let created = store.create(None).await?;
//! let code = created.session.transfer_code.to_string();
//!
//! let joined = store.join(&code.to_lowercase()).await?;
//! assert_ne!(joined.receiver_token, created.sender_token);
//!
//! assert_eq!(store.join(&code).await.unwrap_err(), SessionError::AlreadyJoined);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod error;
mod repository;
mod store;

pub use error::{RepositoryError, SessionError};
pub use repository::{InMemorySessionRepository, SessionRepository};
pub use store::{
    CODE_ALPHABET, Clock, CodeGenerator, CreatedSession, JoinedSession,
    RandomCodeGenerator, SessionStore, SessionStoreConfig, SystemClock,
};
