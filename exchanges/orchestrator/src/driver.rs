//! The per-transfer task.
//!
//! One [`Driver`] runs per side of a transfer. It multiplexes relay frames,
//! peer connection events, the connect watchdog, relay reconnects, the send
//! pump and cancellation in a single `select!` loop, so all transfer state
//! is owned by one task.

use std::{future::pending, sync::Arc};

use peerdrop_entities::Role;
use peerdropx_common::{
    ClientMessage, ControlMessage, DataChannel, ErrorCode, IceCandidate,
    ServerMessage, SessionDescription, Signal, TransportError,
};
use peerdropx_receiver::{Reassembler, ReceiveStep, ReceivingEvent};
use peerdropx_sender::{FallbackUploader, OutgoingFile, send_file};
use tokio::{
    sync::watch,
    task::{JoinError, JoinHandle},
    time::{Instant, sleep_until, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    CandidateBuffer, OrchestratorConfig, OrchestratorState, PeerConnection,
    PeerConnectionFactory, PeerEvent, PeerEvents, RelayConnector, RelayLink,
    RemoteDescription, SessionApi, SessionGrant, TransferError,
    TransferOutcome, bubble::Shared,
};

pub(crate) enum Payload {
    Send(OutgoingFile),
    Receive,
}

/// Collaborators a driver talks to.
#[derive(Clone)]
pub(crate) struct Services {
    pub sessions: Arc<dyn SessionApi>,
    pub connector: Arc<dyn RelayConnector>,
    pub factory: Arc<dyn PeerConnectionFactory>,
    pub uploader: Option<Arc<dyn FallbackUploader>>,
}

type Step = Result<Option<TransferOutcome>, TransferError>;

pub(crate) struct Driver {
    grant: SessionGrant,
    config: OrchestratorConfig,
    payload: Payload,
    services: Services,
    shared: Arc<Shared>,
    link: Option<RelayLink>,
    reconnect_at: Option<Instant>,
    reconnects_used: u32,
    peer: Option<Arc<dyn PeerConnection>>,
    peer_events: Option<PeerEvents>,
    channel: Option<Arc<dyn DataChannel>>,
    candidates: CandidateBuffer,
    watchdog: Option<Instant>,
    send_task: Option<JoinHandle<Result<u64, TransportError>>>,
    reassembler: Reassembler,
    fallback_attempted: bool,
}

impl Driver {
    pub(crate) fn new(
        grant: SessionGrant,
        config: OrchestratorConfig,
        payload: Payload,
        services: Services,
        shared: Arc<Shared>,
    ) -> Self {
        let reassembler = Reassembler::new(config.receiver.clone());
        Self {
            grant,
            config,
            payload,
            services,
            shared,
            link: None,
            reconnect_at: None,
            reconnects_used: 0,
            peer: None,
            peer_events: None,
            channel: None,
            candidates: CandidateBuffer::new(),
            watchdog: None,
            send_task: None,
            reassembler,
            fallback_attempted: false,
        }
    }

    fn role(&self) -> Role {
        self.grant.role
    }

    /// Runs the transfer to its end. A failed first connection goes through
    /// the same backoff as a lost one.
    pub(crate) async fn run(
        mut self,
        connected: Result<RelayLink, TransferError>,
    ) {
        let started = match connected {
            Ok(link) => {
                self.link = Some(link);
                self.join_room();
                Ok(None)
            }
            Err(err) => {
                warn!("Relay unreachable at start: {}", err);
                self.schedule_reconnect(err)
            }
        };
        let driven = match started {
            Ok(_) => self.drive().await,
            Err(err) => Err(err),
        };
        let outcome = match driven {
            Ok(outcome) => outcome,
            Err(err) => self.fail(err).await,
        };
        self.teardown().await;
        info!(
            "Transfer {} finished as {}: {}",
            self.grant.transfer_id,
            self.role(),
            describe(&outcome)
        );
        self.shared.finish(outcome);
    }

    async fn drive(&mut self) -> Result<TransferOutcome, TransferError> {
        let mut cancel = self.shared.cancel_requests();
        loop {
            let step = tokio::select! {
                biased;
                _ = cancellation(&mut cancel) => {
                    Err(self.cancel_locally().await)
                }
                sent = join_send(&mut self.send_task) => {
                    self.send_task = None;
                    self.on_sent(sent).await
                }
                frame = next_frame(&mut self.link) => {
                    self.on_relay(frame).await
                }
                event = next_event(&mut self.peer_events) => {
                    self.on_peer_event(event).await
                }
                _ = wake_at(self.watchdog) => {
                    warn!(
                        "Peer did not connect within {:?}",
                        self.config.connect_timeout
                    );
                    Err(TransferError::ConnectTimeout(
                        self.config.connect_timeout,
                    ))
                }
                _ = wake_at(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.try_reconnect().await
                }
            };
            if let Some(outcome) = step? {
                return Ok(outcome);
            }
        }
    }

    fn enter(&self, next: OrchestratorState) -> Result<(), TransferError> {
        self.shared.transition(next)
    }

    fn join_room(&self) {
        if let Some(link) = &self.link {
            link.send(ClientMessage::JoinRoom {
                transfer_id: self.grant.transfer_id.clone(),
                role: self.role(),
                token: self.grant.token.clone(),
            });
        }
    }

    fn signal(&self, signal: Signal) {
        let Some(link) = &self.link else {
            debug!("No relay connection, dropping {} signal", signal.kind());
            return;
        };
        link.send(ClientMessage::Relay {
            transfer_id: self.grant.transfer_id.clone(),
            role: self.role(),
            token: self.grant.token.clone(),
            signal,
        });
    }

    /// Starts the connect deadline unless one is already running.
    fn arm_watchdog(&mut self) {
        if self.watchdog.is_none() {
            self.watchdog =
                Some(Instant::now() + self.config.connect_timeout);
        }
    }

    // Relay side.

    async fn on_relay(&mut self, frame: Option<ServerMessage>) -> Step {
        let Some(frame) = frame else {
            return self.on_link_lost();
        };
        match frame {
            ServerMessage::JoinedRoom { peer_present, .. } => {
                debug!("Joined room (peer present: {})", peer_present);
                if matches!(
                    self.shared.state(),
                    OrchestratorState::CreatingSession
                        | OrchestratorState::JoiningSession
                ) {
                    self.enter(OrchestratorState::WaitingPeer)?;
                }
                Ok(None)
            }
            ServerMessage::PeerJoined { peer_role, .. } => {
                info!("{} joined the room", peer_role);
                self.signal(Signal::Ready);
                Ok(None)
            }
            ServerMessage::PeerLeft { peer_role, .. } => {
                info!("{} left the room", peer_role);
                self.on_peer_left().await
            }
            ServerMessage::Relay { signal, .. } => self.on_signal(signal).await,
            ServerMessage::Error { code, message } => {
                self.on_relay_error(code, message)
            }
        }
    }

    fn on_relay_error(&mut self, code: ErrorCode, message: String) -> Step {
        let fatal = match code {
            ErrorCode::RoleTaken
            | ErrorCode::InvalidTransferId
            | ErrorCode::InvalidRole
            | ErrorCode::InvalidToken => true,
            ErrorCode::RoomExpired => self.channel.is_none(),
            _ => false,
        };
        if fatal {
            return Err(TransferError::Rejected { code, message });
        }
        warn!("Relay reported {}: {}", code, message);
        Ok(None)
    }

    fn on_link_lost(&mut self) -> Step {
        self.link = None;
        self.schedule_reconnect(TransferError::Relay(
            "connection closed".to_string(),
        ))
    }

    fn schedule_reconnect(&mut self, cause: TransferError) -> Step {
        if self.reconnects_used >= self.config.reconnect_attempts {
            return self.relay_gone(cause);
        }
        self.reconnects_used += 1;
        let delay = self.config.reconnect_delay(self.reconnects_used);
        warn!(
            "Relay connection lost, reconnect attempt {} in {:?}",
            self.reconnects_used, delay
        );
        self.reconnect_at = Some(Instant::now() + delay);
        Ok(None)
    }

    async fn try_reconnect(&mut self) -> Step {
        match self.services.connector.connect().await {
            Ok(link) => {
                info!(
                    "Reconnected to relay on attempt {}",
                    self.reconnects_used
                );
                self.link = Some(link);
                self.join_room();
                Ok(None)
            }
            Err(err) => {
                debug!("Relay reconnect failed: {}", err);
                self.schedule_reconnect(err)
            }
        }
    }

    /// Out of reconnects: only fatal while the direct channel is not open.
    fn relay_gone(&mut self, cause: TransferError) -> Step {
        if self.channel.is_some() {
            warn!("Relay unavailable, continuing over the direct channel");
            return Ok(None);
        }
        Err(cause)
    }

    async fn on_peer_left(&mut self) -> Step {
        if self.channel.is_some() {
            return Ok(None);
        }
        // The watchdog keeps running: the peer has until the original
        // deadline to come back.
        if self.shared.state() == OrchestratorState::Connecting {
            self.close_peer().await;
            self.enter(OrchestratorState::WaitingPeer)?;
        }
        Ok(None)
    }

    async fn on_signal(&mut self, signal: Signal) -> Step {
        match signal {
            Signal::Ready => self.on_peer_ready().await,
            Signal::Offer(offer) => self.on_offer(offer).await,
            Signal::Answer(answer) => self.on_answer(answer).await,
            Signal::IceCandidate(candidate) => {
                self.on_remote_candidate(candidate).await
            }
            Signal::Cancel { reason } => Err(TransferError::Cancelled {
                by_peer: true,
                reason,
            }),
            Signal::Error { code, message } => {
                Err(TransportError::Negotiation(format!("{code}: {message}"))
                    .into())
            }
        }
    }

    // Handshake.

    async fn on_peer_ready(&mut self) -> Step {
        if self.channel.is_some() {
            debug!("Peer is ready again, channel already open");
            return Ok(None);
        }
        if self.shared.state() == OrchestratorState::WaitingPeer {
            self.enter(OrchestratorState::Connecting)?;
            self.arm_watchdog();
        }
        if self.role() == Role::Sender {
            self.close_peer().await;
            let peer = self.open_peer().await?;
            let offer = peer.create_offer().await?;
            self.signal(Signal::Offer(offer));
        }
        Ok(None)
    }

    async fn on_offer(&mut self, offer: SessionDescription) -> Step {
        if self.role() != Role::Receiver || self.channel.is_some() {
            debug!("Ignoring unexpected offer");
            return Ok(None);
        }
        if self.shared.state() == OrchestratorState::WaitingPeer {
            self.enter(OrchestratorState::Connecting)?;
            self.arm_watchdog();
        }
        self.close_peer().await;
        let peer = self.open_peer().await?;
        peer.set_remote_description(RemoteDescription::Offer(offer))
            .await?;
        self.flush_candidates(&peer).await;
        let answer = peer.create_answer().await?;
        self.signal(Signal::Answer(answer));
        Ok(None)
    }

    async fn on_answer(&mut self, answer: SessionDescription) -> Step {
        let Some(peer) = self.peer.clone() else {
            debug!("Ignoring answer without a pending offer");
            return Ok(None);
        };
        if self.role() != Role::Sender {
            return Ok(None);
        }
        peer.set_remote_description(RemoteDescription::Answer(answer))
            .await?;
        self.flush_candidates(&peer).await;
        Ok(None)
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Step {
        if let Some(candidate) = self.candidates.push(candidate) {
            if let Some(peer) = &self.peer {
                if let Err(e) = peer.add_ice_candidate(candidate).await {
                    warn!("Failed to add remote candidate: {}", e);
                }
            }
        }
        Ok(None)
    }

    async fn flush_candidates(&mut self, peer: &Arc<dyn PeerConnection>) {
        let held = self.candidates.release();
        if !held.is_empty() {
            debug!("Applying {} buffered candidates", held.len());
        }
        for candidate in held {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                warn!("Failed to add remote candidate: {}", e);
            }
        }
    }

    async fn open_peer(
        &mut self,
    ) -> Result<Arc<dyn PeerConnection>, TransferError> {
        let (peer, events) = self.services.factory.create(self.role()).await?;
        self.peer = Some(peer.clone());
        self.peer_events = Some(events);
        Ok(peer)
    }

    /// Drops the current connection attempt. Candidates buffered while no
    /// attempt existed are kept for the next one.
    async fn close_peer(&mut self) {
        self.peer_events = None;
        if let Some(peer) = self.peer.take() {
            self.candidates.reset();
            peer.close().await;
        }
    }

    // Direct channel.

    async fn on_peer_event(&mut self, event: Option<PeerEvent>) -> Step {
        let Some(event) = event else {
            self.peer_events = None;
            return self.on_channel_closed().await;
        };
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                self.signal(Signal::IceCandidate(candidate));
                Ok(None)
            }
            PeerEvent::ChannelOpen(channel) => {
                self.on_channel_open(channel)
            }
            PeerEvent::ChannelClosed => self.on_channel_closed().await,
            PeerEvent::Text(text) => self.on_control(&text),
            PeerEvent::Binary(bytes) => self.on_chunk(&bytes),
            PeerEvent::Failed(err) => Err(err.into()),
        }
    }

    fn on_channel_open(&mut self, channel: Arc<dyn DataChannel>) -> Step {
        self.watchdog = None;
        self.channel = Some(channel.clone());
        self.enter(OrchestratorState::Connected)?;
        info!("Direct channel open");

        if let Payload::Send(file) = &self.payload {
            self.enter(OrchestratorState::Transferring)?;
            let file = file.clone();
            let chunk = self.config.chunk.clone();
            let shared = self.shared.clone();
            self.send_task = Some(tokio::spawn(async move {
                send_file(channel.as_ref(), &file, &chunk, |event| {
                    shared.notify_sending(event)
                })
                .await
            }));
        }
        Ok(None)
    }

    async fn on_channel_closed(&mut self) -> Step {
        let was_open = self.channel.take().is_some();
        // `done` may have gone out just before the peer hung up.
        if let Some(task) = self.send_task.take() {
            if task.is_finished() {
                let sent = sent_result(task.await);
                return self.on_sent(sent).await;
            }
            task.abort();
        }
        if !was_open {
            return Err(TransportError::ConnectionFailed(
                "peer connection closed before the channel opened"
                    .to_string(),
            )
            .into());
        }
        Err(TransferError::ChannelClosed)
    }

    fn on_control(&mut self, text: &str) -> Step {
        let message = match ControlMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring unreadable control frame: {}", e);
                return Ok(None);
            }
        };
        if let ControlMessage::Cancel { reason } = message {
            return Err(TransferError::Cancelled {
                by_peer: true,
                reason,
            });
        }
        if let Payload::Send(_) = self.payload {
            debug!("Sender ignoring {:?}", message);
            return Ok(None);
        }
        match self.reassembler.on_control(message)? {
            ReceiveStep::Started { name, size } => {
                self.enter(OrchestratorState::Transferring)?;
                self.shared.notify_receiving(ReceivingEvent {
                    name,
                    received: 0,
                    remaining: size,
                });
                Ok(None)
            }
            ReceiveStep::Finished(file) => {
                self.enter(OrchestratorState::Completed)?;
                Ok(Some(TransferOutcome::Received(file)))
            }
            ReceiveStep::Cancelled { reason } => Err(TransferError::Cancelled {
                by_peer: true,
                reason,
            }),
        }
    }

    fn on_chunk(&mut self, bytes: &[u8]) -> Step {
        if let Payload::Send(_) = self.payload {
            debug!("Sender ignoring {} inbound bytes", bytes.len());
            return Ok(None);
        }
        let event = self.reassembler.on_chunk(bytes)?;
        self.shared.notify_receiving(event);
        Ok(None)
    }

    async fn on_sent(&mut self, sent: Result<u64, TransferError>) -> Step {
        let bytes = sent?;
        self.enter(OrchestratorState::Completed)?;
        if let Err(e) = self
            .services
            .sessions
            .close(&self.grant.transfer_id, &self.grant.token)
            .await
        {
            warn!("Could not close session {}: {}", self.grant.transfer_id, e);
        }
        Ok(Some(TransferOutcome::Sent { bytes }))
    }

    // Endings.

    async fn cancel_locally(&mut self) -> TransferError {
        info!("Transfer {} cancelled locally", self.grant.transfer_id);
        if let Some(channel) = &self.channel {
            let _ = channel
                .send_control(&ControlMessage::Cancel { reason: None })
                .await;
        }
        self.signal(Signal::Cancel { reason: None });
        TransferError::Cancelled {
            by_peer: false,
            reason: None,
        }
    }

    async fn fail(&mut self, err: TransferError) -> TransferOutcome {
        warn!("Transfer {} failed: {}", self.grant.transfer_id, err);
        if !err.is_cancellation() {
            if let Some(channel) = &self.channel {
                let _ = channel
                    .send_control(&ControlMessage::Cancel {
                        reason: Some(err.to_string()),
                    })
                    .await;
            }
        }
        if let Err(e) = self.enter(OrchestratorState::Failed) {
            debug!("{}", e);
        }
        match self.fall_back(&err).await {
            Some(outcome) => outcome,
            None => TransferOutcome::Failed(err),
        }
    }

    /// Runs the store-and-forward upload, at most once per attempt.
    async fn fall_back(&mut self, err: &TransferError) -> Option<TransferOutcome> {
        let Payload::Send(file) = &self.payload else {
            return None;
        };
        if err.is_cancellation() || self.fallback_attempted {
            return None;
        }
        let uploader = self.services.uploader.clone()?;
        if file.size() > self.config.fallback_ceiling {
            info!(
                "{} is too large for the fallback ({} > {} bytes)",
                file.name,
                file.size(),
                self.config.fallback_ceiling
            );
            return None;
        }

        self.fallback_attempted = true;
        info!("Falling back to upload for {}", file.name);
        Some(match uploader.upload(file).await {
            Ok(receipt) => TransferOutcome::FellBack(receipt),
            Err(e) => TransferOutcome::Failed(TransferError::Fallback(
                format!("{e:#} (after: {err})"),
            )),
        })
    }

    async fn teardown(&mut self) {
        self.watchdog = None;
        self.reconnect_at = None;
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        if let Some(channel) = self.channel.take() {
            if channel.is_open() {
                if timeout(self.config.chunk.drain_timeout, channel.drained())
                    .await
                    .is_err()
                {
                    debug!("Channel did not drain before close");
                }
                channel.close().await;
            }
        }
        self.close_peer().await;
        if let Some(link) = self.link.take() {
            link.send(ClientMessage::LeaveRoom {
                transfer_id: self.grant.transfer_id.clone(),
                role: self.role(),
                token: self.grant.token.clone(),
            });
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shared
            .finish(TransferOutcome::Failed(TransferError::Interrupted));
    }
}

fn describe(outcome: &TransferOutcome) -> String {
    match outcome {
        TransferOutcome::Sent { bytes } => format!("sent {bytes} bytes"),
        TransferOutcome::Received(file) => {
            format!("received {} ({} bytes)", file.name, file.size)
        }
        TransferOutcome::FellBack(receipt) => {
            format!("uploaded to {}", receipt.location)
        }
        TransferOutcome::Failed(err) => format!("failed: {err}"),
    }
}

async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|requested| *requested).await;
}

async fn next_frame(link: &mut Option<RelayLink>) -> Option<ServerMessage> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => pending().await,
    }
}

async fn next_event(events: &mut Option<PeerEvents>) -> Option<PeerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn wake_at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn join_send(
    task: &mut Option<JoinHandle<Result<u64, TransportError>>>,
) -> Result<u64, TransferError> {
    match task {
        Some(handle) => sent_result(handle.await),
        None => pending().await,
    }
}

fn sent_result(
    joined: Result<Result<u64, TransportError>, JoinError>,
) -> Result<u64, TransferError> {
    match joined {
        Ok(result) => result.map_err(TransferError::from),
        Err(e) => Err(TransportError::SendFailed(e.to_string()).into()),
    }
}
