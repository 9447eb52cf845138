//! Per-connection state machine of the relay.
//!
//! A [`Connection`] consumes the typed [`Inbound`] events of one socket
//! through [`Connection::dispatch`], in arrival order. Every effect on the
//! outside world goes through the registry or the connection's
//! [`PeerSink`], so the machine runs the same with or without a network.

use std::{sync::Arc, time::Duration};

use peerdropx_common::{
    ClientFrame, ErrorCode, FrameError, JoinRequest, ServerMessage, Signal,
};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{PeerSink, Registry, SlidingWindow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLimits {
    pub max_message_bytes: usize,
    pub rate_limit_messages: usize,
    pub rate_limit_window: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: 262_144,
            rate_limit_messages: 120,
            rate_limit_window: Duration::from_secs(10),
        }
    }
}

pub struct Connection {
    registry: Arc<Registry>,
    sink: PeerSink,
    max_message_bytes: usize,
    limiter: SlidingWindow,
    binding: Option<JoinRequest>,
    closed: bool,
}

impl Connection {
    pub fn new(
        registry: Arc<Registry>,
        sink: PeerSink,
        limits: &ConnectionLimits,
    ) -> Self {
        Self {
            registry,
            sink,
            max_message_bytes: limits.max_message_bytes,
            limiter: SlidingWindow::new(
                limits.rate_limit_messages,
                limits.rate_limit_window,
            ),
            binding: None,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.sink.id()
    }

    /// The `join-room` credentials this connection is bound to.
    pub fn binding(&self) -> Option<&JoinRequest> {
        self.binding.as_ref()
    }

    pub async fn dispatch(&mut self, event: Inbound) -> Flow {
        if self.closed {
            return Flow::Close;
        }
        match event {
            Inbound::Disconnected => {
                self.teardown().await;
                Flow::Close
            }
            Inbound::Text(text) => {
                if let Some(flow) = self.screen(text.len()).await {
                    return flow;
                }
                match ClientFrame::decode(&text) {
                    Ok(frame) => self.on_frame(frame).await,
                    Err(err) => self.reject(err).await,
                }
            }
            Inbound::Binary(bytes) => {
                if let Some(flow) = self.screen(bytes.len()).await {
                    return flow;
                }
                self.reject(FrameError::new(
                    ErrorCode::InvalidFrame,
                    "frames must be JSON text",
                ))
                .await
            }
        }
    }

    /// Rate limit and size checks, applied to every frame before parsing.
    async fn screen(&mut self, len: usize) -> Option<Flow> {
        if !self.limiter.admit(Instant::now()) {
            warn!("Connection {} exceeded the message rate", self.id());
            self.registry.metrics().rate_limit_closure();
            return Some(
                self.reject(FrameError::new(
                    ErrorCode::RateLimited,
                    "too many messages",
                ))
                .await,
            );
        }
        if len > self.max_message_bytes {
            return Some(
                self.reject(FrameError::new(
                    ErrorCode::MessageTooLarge,
                    format!(
                        "frame of {} bytes exceeds {} bytes",
                        len, self.max_message_bytes
                    ),
                ))
                .await,
            );
        }
        None
    }

    async fn on_frame(&mut self, frame: ClientFrame) -> Flow {
        let result = match frame {
            ClientFrame::JoinRoom {
                transfer_id,
                role,
                token,
            } => self.on_join(&transfer_id, &role, &token).await,
            ClientFrame::Relay {
                transfer_id,
                role,
                token,
                signal,
            } => self.on_relay(&transfer_id, &role, &token, signal).await,
            ClientFrame::LeaveRoom {
                transfer_id,
                role,
                token,
            } => self.on_leave(&transfer_id, &role, &token).await,
        };
        match result {
            Ok(()) => Flow::Continue,
            Err(err) => self.reject(err).await,
        }
    }

    async fn on_join(
        &mut self,
        transfer_id: &str,
        role: &str,
        token: &str,
    ) -> Result<(), FrameError> {
        let request = JoinRequest::validate(transfer_id, role, token)?;
        if let Some(previous) = self.binding.take() {
            if previous != request {
                self.registry.disconnect(self.id(), &previous).await;
            }
        }
        self.registry
            .join(&self.sink, &request)
            .await
            .map_err(|code| {
                FrameError::new(code, format!("{} slot is taken", request.role))
                    .in_join()
            })?;
        self.binding = Some(request);
        Ok(())
    }

    async fn on_relay(
        &mut self,
        transfer_id: &str,
        role: &str,
        token: &str,
        signal: Value,
    ) -> Result<(), FrameError> {
        let binding = self.bound_as(transfer_id, role, token)?;
        let signal = Signal::decode(&signal).map_err(|e| {
            FrameError::new(ErrorCode::InvalidSignal, e.to_string())
        })?;
        self.registry
            .relay(&self.sink, &binding, signal)
            .await
            .map_err(|code| FrameError::new(code, describe(code)))
    }

    async fn on_leave(
        &mut self,
        transfer_id: &str,
        role: &str,
        token: &str,
    ) -> Result<(), FrameError> {
        let binding = self.bound_as(transfer_id, role, token)?;
        let result = self.registry.leave(self.id(), &binding).await;
        self.binding = None;
        result.map_err(|code| FrameError::new(code, describe(code)))
    }

    /// Checks a `relay`/`leave-room` envelope against the join binding.
    fn bound_as(
        &self,
        transfer_id: &str,
        role: &str,
        token: &str,
    ) -> Result<JoinRequest, FrameError> {
        let binding = self.binding.as_ref().ok_or_else(|| {
            FrameError::new(ErrorCode::NotJoined, describe(ErrorCode::NotJoined))
        })?;
        if binding.transfer_id != transfer_id
            || binding.role.as_str() != role
            || binding.token != token
        {
            return Err(FrameError::new(
                ErrorCode::AuthMismatch,
                "envelope does not match this connection's join",
            ));
        }
        Ok(binding.clone())
    }

    async fn reject(&mut self, err: FrameError) -> Flow {
        debug!("Connection {} rejected frame: {}", self.id(), err);
        self.registry.metrics().frame_rejected();
        self.sink.send(ServerMessage::from(&err));
        if err.closes_connection() {
            self.sink.close();
            self.teardown().await;
            Flow::Close
        } else {
            Flow::Continue
        }
    }

    async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(binding) = self.binding.take() {
            self.registry.disconnect(self.id(), &binding).await;
        }
        self.registry.connection_closed(self.id());
    }
}

fn describe(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::NotJoined => "connection has not joined a room",
        ErrorCode::MissingRoom => "room no longer exists",
        ErrorCode::PeerMissing => "peer is not connected",
        _ => "request rejected",
    }
}
