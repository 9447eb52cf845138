use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerdrop_entities::{Role, TransferCode};
use peerdrop_session::{
    CreatedSession, JoinedSession, SessionError, SessionStore,
    api::{
        CloseSessionRequest, CreateSessionRequest, CreateSessionResponse,
        ErrorResponse, JoinSessionRequest, JoinSessionResponse,
    },
};
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::TransferError;

/// What one party needs to take its place in a transfer room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionGrant {
    pub transfer_id: String,
    pub transfer_code: TransferCode,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<CreatedSession> for SessionGrant {
    fn from(created: CreatedSession) -> Self {
        Self {
            transfer_id: created.session.transfer_id,
            transfer_code: created.session.transfer_code,
            role: Role::Sender,
            token: created.sender_token,
            expires_at: created.session.expires_at,
        }
    }
}

impl From<JoinedSession> for SessionGrant {
    fn from(joined: JoinedSession) -> Self {
        Self {
            transfer_id: joined.session.transfer_id,
            transfer_code: joined.session.transfer_code,
            role: Role::Receiver,
            token: joined.receiver_token,
            expires_at: joined.session.expires_at,
        }
    }
}

/// The session service as seen by a client.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn create(
        &self,
        ttl_minutes: Option<i64>,
    ) -> Result<SessionGrant, TransferError>;

    async fn join(&self, code: &str) -> Result<SessionGrant, TransferError>;

    /// Marks a joined session closed once the sender is done with it.
    async fn close(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<(), TransferError>;
}

#[async_trait]
impl SessionApi for SessionStore {
    async fn create(
        &self,
        ttl_minutes: Option<i64>,
    ) -> Result<SessionGrant, TransferError> {
        Ok(SessionStore::create(self, ttl_minutes).await?.into())
    }

    async fn join(&self, code: &str) -> Result<SessionGrant, TransferError> {
        Ok(SessionStore::join(self, code).await?.into())
    }

    async fn close(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<(), TransferError> {
        SessionStore::close(self, transfer_id, sender_token).await?;
        Ok(())
    }
}

/// Talks to the relay's `/api/transfers` routes.
#[derive(Clone, Debug)]
pub struct HttpSessionApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSessionApi {
    /// `base_url` is the server root, e.g. `http://localhost:8787`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/transfers{}", self.base_url, path)
    }
}

async fn parse<T: DeserializeOwned>(
    response: Response,
) -> Result<T, TransferError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| TransferError::SessionService(e.to_string()));
    }
    match response.json::<ErrorResponse>().await {
        Ok(body) => {
            debug!("Session service answered {}: {}", status, body.error);
            Err(SessionError::from(body).into())
        }
        Err(_) => Err(TransferError::SessionService(format!(
            "unexpected status {status}"
        ))),
    }
}

fn unreachable(err: reqwest::Error) -> TransferError {
    TransferError::SessionService(err.to_string())
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn create(
        &self,
        ttl_minutes: Option<i64>,
    ) -> Result<SessionGrant, TransferError> {
        let response = self
            .client
            .post(self.url(""))
            .json(&CreateSessionRequest {
                ttl_minutes: ttl_minutes.map(|minutes| minutes as f64),
            })
            .send()
            .await
            .map_err(unreachable)?;
        let body: CreateSessionResponse = parse(response).await?;
        Ok(SessionGrant {
            transfer_id: body.session.transfer_id,
            transfer_code: body.session.transfer_code,
            role: Role::Sender,
            token: body.sender_token,
            expires_at: body.session.expires_at,
        })
    }

    async fn join(&self, code: &str) -> Result<SessionGrant, TransferError> {
        let response = self
            .client
            .post(self.url("/join"))
            .json(&JoinSessionRequest {
                transfer_code: code.to_string(),
            })
            .send()
            .await
            .map_err(unreachable)?;
        let body: JoinSessionResponse = parse(response).await?;
        Ok(SessionGrant {
            transfer_id: body.session.transfer_id,
            transfer_code: body.session.transfer_code,
            role: Role::Receiver,
            token: body.receiver_token,
            expires_at: body.session.expires_at,
        })
    }

    async fn close(
        &self,
        transfer_id: &str,
        sender_token: &str,
    ) -> Result<(), TransferError> {
        let response = self
            .client
            .post(self.url(&format!("/{transfer_id}/close")))
            .json(&CloseSessionRequest {
                sender_token: sender_token.to_string(),
            })
            .send()
            .await
            .map_err(unreachable)?;
        parse::<serde_json::Value>(response).await?;
        Ok(())
    }
}
