//! HTTP and WebSocket surface of the relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use peerdrop_session::{
    InMemorySessionRepository, SessionError, SessionStore,
    api::{
        CloseSessionRequest, CreateSessionRequest, CreateSessionResponse,
        ErrorResponse, JoinSessionRequest, JoinSessionResponse,
        SessionResponse,
    },
};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    Connection, ConnectionLimits, Flow, Inbound, MetricsSnapshot, Outbound,
    Registry, RelayConfig, spawn_sweeper,
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub sessions: SessionStore,
    pub limits: ConnectionLimits,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/api/transfers", post(create_session))
        .route("/api/transfers/join", post(join_session))
        .route("/api/transfers/:id", get(get_session))
        .route("/api/transfers/:id/close", post(close_session))
        .with_state(state)
}

pub struct RelayServer {
    config: RelayConfig,
    state: AppState,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry =
            Arc::new(Registry::new().with_event_logging(config.log_events));
        let sessions = SessionStore::with_config(
            Arc::new(InMemorySessionRepository::new()),
            config.session_store_config(),
        );
        let state = AppState {
            registry,
            sessions,
            limits: config.limits(),
        };
        Self { config, state }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.state.registry.clone()
    }

    pub fn sessions(&self) -> SessionStore {
        self.state.sessions.clone()
    }

    /// Binds `listen_addr` and serves until the process stops.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| {
                format!("Failed to bind {}", self.config.listen_addr)
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Relay listening on {}", addr);
        let sweeper = spawn_sweeper(
            self.state.registry.clone(),
            self.config.sweep_interval(),
            self.config.idle_room_ttl(),
        );
        let result = axum::serve(listener, router(self.state))
            .await
            .context("Relay server stopped");
        sweeper.abort();
        result
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let sink = state.registry.open_connection(tx);
    let conn_id = sink.id();

    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(message) => {
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to encode frame: {}", e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut connection =
        Connection::new(state.registry.clone(), sink, &state.limits);
    let mut writer_done = false;
    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => Inbound::Text(text),
                    Some(Ok(Message::Binary(bytes))) => Inbound::Binary(bytes),
                    Some(Ok(Message::Close(_))) | None => Inbound::Disconnected,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error on connection {}: {}", conn_id, e);
                        Inbound::Disconnected
                    }
                };
                if connection.dispatch(event).await == Flow::Close {
                    break;
                }
            }
            _ = &mut send_task, if !writer_done => {
                // Closed from elsewhere: stale replacement or idle sweep.
                writer_done = true;
                connection.dispatch(Inbound::Disconnected).await;
                break;
            }
        }
    }

    drop(connection);
    if !writer_done {
        // The writer drains queued frames and ends on `Close`, or once every
        // sink clone is dropped.
        if tokio::time::timeout(std::time::Duration::from_secs(5), send_task)
            .await
            .is_err()
        {
            debug!("Writer for connection {} did not finish", conn_id);
        }
    }
}

async fn health_check() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.registry.metrics().snapshot())
}

struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::NotFound => StatusCode::NOT_FOUND,
            SessionError::Expired => StatusCode::GONE,
            SessionError::AlreadyJoined | SessionError::NotJoined => {
                StatusCode::CONFLICT
            }
            SessionError::InvalidCode(_) | SessionError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            SessionError::CouldNotAllocate(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SessionError::Forbidden => StatusCode::FORBIDDEN,
            SessionError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Session request failed: {}", self.0);
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let request = CreateSessionRequest::parse(&body)?;
    let created = state.sessions.create(request.whole_minutes()).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            success: true,
            session: (&created.session).into(),
            sender_token: created.sender_token,
        }),
    ))
}

async fn join_session(
    State(state): State<AppState>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>, ApiError> {
    let joined = state.sessions.join(&request.transfer_code).await?;
    Ok(Json(JoinSessionResponse {
        success: true,
        session: (&joined.session).into(),
        receiver_token: joined.receiver_token,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .sessions
        .get(&id)
        .await?
        .ok_or(SessionError::NotFound)?;
    Ok(Json(SessionResponse {
        success: true,
        session: (&session).into(),
    }))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CloseSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.sessions.close(&id, &request.sender_token).await?;
    Ok(Json(SessionResponse {
        success: true,
        session: (&session).into(),
    }))
}
