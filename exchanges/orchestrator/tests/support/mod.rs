//! Test doubles for driving whole transfers in one process.
//!
//! - [`InProcessRelay`] runs the real relay connection state machine over
//!   channels instead of sockets.
//! - [`ScriptedRelay`] hands each link to the test, which plays the relay.
//! - [`MockNetwork`] pairs offers with answers and opens linked in-memory
//!   data channels.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use peerdrop_entities::{MemoryData, Role};
use peerdrop_relay::{
    Connection, ConnectionLimits, Flow, Inbound, Outbound, Registry,
};
use peerdrop_session::{InMemorySessionRepository, SessionStore};
use peerdropx_common::{
    ClientMessage, DataChannel, IceCandidate, ServerMessage,
    SessionDescription, TransportError,
};
use peerdropx_orchestrator::{
    Orchestrator, OrchestratorState, PeerConnection, PeerConnectionFactory,
    PeerEvent, PeerEvents, RelayConnector, RelayLink, RemoteDescription,
    StateChangedEvent, TransferError, TransferSubscriber,
};
use peerdropx_receiver::ReceivingEvent;
use peerdropx_sender::{
    FallbackReceipt, FallbackUploader, OutgoingFile, SendingEvent,
};
use rand::Rng;
use tokio::sync::{broadcast, mpsc};

pub fn session_store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Arc::new(InMemorySessionRepository::new())))
}

pub fn orchestrator(
    sessions: Arc<SessionStore>,
    relay: Arc<dyn RelayConnector>,
    network: Arc<MockNetwork>,
) -> Orchestrator {
    Orchestrator::new(sessions, relay, network)
}

/// A file of `size` random bytes.
pub fn random_file(name: &str, size: usize) -> OutgoingFile {
    let mut bytes = vec![0u8; size];
    rand::rng().fill(&mut bytes[..]);
    OutgoingFile::new(
        name,
        "application/octet-stream",
        Arc::new(MemoryData::new(bytes)),
    )
}

pub fn file_bytes(file: &OutgoingFile) -> Vec<u8> {
    file.data.read_all()
}

// Relays.

/// The relay's connection state machine, fed over channels.
pub struct InProcessRelay {
    registry: Arc<Registry>,
    connects: AtomicU32,
    refusing: AtomicBool,
    cut: broadcast::Sender<()>,
}

impl InProcessRelay {
    pub fn new() -> Arc<Self> {
        let (cut, _) = broadcast::channel(4);
        Arc::new(Self {
            registry: Arc::new(Registry::new()),
            connects: AtomicU32::new(0),
            refusing: AtomicBool::new(false),
            cut,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Connection attempts so far, refused ones included.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self) {
        self.refusing.store(true, Ordering::SeqCst);
    }

    pub fn accept_connections(&self) {
        self.refusing.store(false, Ordering::SeqCst);
    }

    /// Drops every open link as if the relay restarted.
    pub fn cut_links(&self) {
        let _ = self.cut.send(());
    }
}

#[async_trait]
impl RelayConnector for InProcessRelay {
    async fn connect(&self) -> Result<RelayLink, TransferError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransferError::Relay("connection refused".to_string()));
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<Outbound>();
        let sink = self.registry.open_connection(sink_tx);
        let mut conn = Connection::new(
            self.registry.clone(),
            sink,
            &ConnectionLimits::default(),
        );
        let mut cut = self.cut.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = out_rx.recv() => {
                        let event = match message {
                            Some(message) => {
                                Inbound::Text(message.encode().unwrap())
                            }
                            None => Inbound::Disconnected,
                        };
                        if conn.dispatch(event).await == Flow::Close {
                            break;
                        }
                    }
                    Some(outbound) = sink_rx.recv() => match outbound {
                        Outbound::Frame(frame) => {
                            let _ = in_tx.send(frame);
                        }
                        Outbound::Close => {
                            conn.dispatch(Inbound::Disconnected).await;
                            break;
                        }
                    },
                    _ = cut.recv() => {
                        conn.dispatch(Inbound::Disconnected).await;
                        break;
                    }
                }
            }
            // Frames queued before the close still reach the client.
            while let Ok(Outbound::Frame(frame)) = sink_rx.try_recv() {
                let _ = in_tx.send(frame);
            }
        });

        Ok(RelayLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// The test's end of one scripted relay connection.
pub struct ScriptedLink {
    pub from_client: mpsc::UnboundedReceiver<ClientMessage>,
    pub to_client: mpsc::UnboundedSender<ServerMessage>,
}

impl ScriptedLink {
    pub async fn next(&mut self) -> ClientMessage {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("client went quiet")
            .expect("client hung up")
    }

    pub fn push(&self, message: ServerMessage) {
        self.to_client.send(message).unwrap();
    }
}

/// A relay whose every frame comes from the test.
pub struct ScriptedRelay {
    links: mpsc::UnboundedSender<ScriptedLink>,
}

impl ScriptedRelay {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ScriptedLink>) {
        let (links, accepted) = mpsc::unbounded_channel();
        (Arc::new(Self { links }), accepted)
    }
}

#[async_trait]
impl RelayConnector for ScriptedRelay {
    async fn connect(&self) -> Result<RelayLink, TransferError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        self.links
            .send(ScriptedLink {
                from_client: out_rx,
                to_client: in_tx,
            })
            .map_err(|_| TransferError::Relay("script ended".to_string()))?;
        Ok(RelayLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

// Peer network.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMode {
    Reliable,
    /// Negotiation succeeds but no channel ever opens.
    Unreachable,
    /// The sender's channel dies when it tries to send chunk `n + 1`.
    DropAfterChunks(usize),
}

type ChannelSlot = Arc<Mutex<Option<Arc<MockChannel>>>>;

#[derive(Clone)]
struct Endpoint {
    events: mpsc::UnboundedSender<PeerEvent>,
    channel: ChannelSlot,
}

#[derive(Default)]
struct Switchboard {
    offers: HashMap<String, Endpoint>,
    answers: HashMap<String, Endpoint>,
}

pub struct MockNetwork {
    mode: LinkMode,
    board: Arc<Mutex<Switchboard>>,
    peers: Mutex<Vec<Arc<MockPeer>>>,
    next_id: AtomicU32,
}

impl MockNetwork {
    pub fn new(mode: LinkMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            board: Arc::default(),
            peers: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(0),
        })
    }

    pub fn peers(&self, role: Role) -> Vec<Arc<MockPeer>> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PeerConnectionFactory for MockNetwork {
    async fn create(
        &self,
        role: Role,
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents), TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (events, rx) = mpsc::unbounded_channel();
        let peer = Arc::new(MockPeer {
            id,
            role,
            mode: self.mode,
            board: self.board.clone(),
            local: Endpoint {
                events,
                channel: ChannelSlot::default(),
            },
            has_remote: AtomicBool::new(false),
            added: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok((peer, rx))
    }
}

pub struct MockPeer {
    id: u32,
    role: Role,
    mode: LinkMode,
    board: Arc<Mutex<Switchboard>>,
    local: Endpoint,
    has_remote: AtomicBool,
    added: Mutex<Vec<(String, bool)>>,
    closed: AtomicBool,
}

impl MockPeer {
    /// Remote candidates in the order they were added, each with whether
    /// the remote description was already set at the time.
    pub fn added_candidates(&self) -> Vec<(String, bool)> {
        self.added.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn announce_candidate(&self) {
        let candidate = IceCandidate::new(format!(
            "candidate:{} 1 udp 2122260223 10.0.0.{} 5000{} typ host",
            self.id, self.id, self.id
        ));
        let _ = self.local.events.send(PeerEvent::LocalCandidate(candidate));
    }

    fn open_channels(&self, remote: &Endpoint) {
        let open = Arc::new(AtomicBool::new(true));
        let limit = match self.mode {
            LinkMode::DropAfterChunks(n) => Some(n),
            _ => None,
        };
        let mine = Arc::new(MockChannel {
            to_peer: remote.events.clone(),
            to_self: self.local.events.clone(),
            open: open.clone(),
            chunks: AtomicUsize::new(0),
            drop_after: limit,
        });
        let theirs = Arc::new(MockChannel {
            to_peer: self.local.events.clone(),
            to_self: remote.events.clone(),
            open,
            chunks: AtomicUsize::new(0),
            drop_after: None,
        });
        *self.local.channel.lock().unwrap() = Some(mine.clone());
        *remote.channel.lock().unwrap() = Some(theirs.clone());
        let _ = remote.events.send(PeerEvent::ChannelOpen(theirs));
        let _ = self.local.events.send(PeerEvent::ChannelOpen(mine));
    }
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let sdp = format!("v=0 offer {}", self.id);
        self.board
            .lock()
            .unwrap()
            .offers
            .insert(sdp.clone(), self.local.clone());
        self.announce_candidate();
        Ok(SessionDescription { sdp })
    }

    async fn create_answer(
        &self,
    ) -> Result<SessionDescription, TransportError> {
        if !self.has_remote.load(Ordering::SeqCst) {
            return Err(TransportError::Negotiation(
                "answer without an offer".to_string(),
            ));
        }
        let sdp = format!("v=0 answer {}", self.id);
        self.board
            .lock()
            .unwrap()
            .answers
            .insert(sdp.clone(), self.local.clone());
        self.announce_candidate();
        Ok(SessionDescription { sdp })
    }

    async fn set_remote_description(
        &self,
        description: RemoteDescription,
    ) -> Result<(), TransportError> {
        self.has_remote.store(true, Ordering::SeqCst);
        let RemoteDescription::Answer(answer) = description else {
            return Ok(());
        };
        let remote = self.board.lock().unwrap().answers.get(&answer.sdp).cloned();
        let Some(remote) = remote else {
            return Err(TransportError::Negotiation(format!(
                "unknown answer {}",
                answer.sdp
            )));
        };
        if self.mode != LinkMode::Unreachable {
            self.open_channels(&remote);
        }
        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), TransportError> {
        let ready = self.has_remote.load(Ordering::SeqCst);
        self.added
            .lock()
            .unwrap()
            .push((candidate.candidate, ready));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let channel = self.local.channel.lock().unwrap().take();
        if let Some(channel) = channel {
            channel.close().await;
        }
    }
}

/// One end of an in-memory channel pair. Both ends share the open flag.
pub struct MockChannel {
    to_peer: mpsc::UnboundedSender<PeerEvent>,
    to_self: mpsc::UnboundedSender<PeerEvent>,
    open: Arc<AtomicBool>,
    chunks: AtomicUsize,
    drop_after: Option<usize>,
}

impl MockChannel {
    fn hang_up(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.to_peer.send(PeerEvent::ChannelClosed);
            let _ = self.to_self.send(PeerEvent::ChannelClosed);
        }
    }
}

#[async_trait]
impl DataChannel for MockChannel {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let _ = self.to_peer.send(PeerEvent::Text(text));
        Ok(())
    }

    async fn send_binary(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let sent = self.chunks.fetch_add(1, Ordering::SeqCst) + 1;
        if self.drop_after.is_some_and(|limit| sent > limit) {
            self.hang_up();
            return Err(TransportError::Closed);
        }
        let _ = self.to_peer.send(PeerEvent::Binary(bytes));
        Ok(())
    }

    fn buffered_amount(&self) -> u64 {
        0
    }

    async fn drained(&self) {}

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.hang_up();
    }
}

// Observers.

pub struct RecordingUploader {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackUploader for RecordingUploader {
    async fn upload(&self, file: &OutgoingFile) -> Result<FallbackReceipt> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("storage unavailable");
        }
        Ok(FallbackReceipt {
            location: format!("memory://{}", file.name),
            size: file.size(),
        })
    }
}

pub struct RecordingSubscriber {
    id: String,
    states: Mutex<Vec<StateChangedEvent>>,
    sending: Mutex<Vec<SendingEvent>>,
    receiving: Mutex<Vec<ReceivingEvent>>,
}

impl RecordingSubscriber {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            states: Mutex::new(Vec::new()),
            sending: Mutex::new(Vec::new()),
            receiving: Mutex::new(Vec::new()),
        })
    }

    /// The state entered by each recorded change.
    pub fn entered(&self) -> Vec<OrchestratorState> {
        self.states.lock().unwrap().iter().map(|e| e.to).collect()
    }

    pub fn sending(&self) -> Vec<SendingEvent> {
        self.sending.lock().unwrap().clone()
    }

    pub fn receiving(&self) -> Vec<ReceivingEvent> {
        self.receiving.lock().unwrap().clone()
    }
}

impl TransferSubscriber for RecordingSubscriber {
    fn get_id(&self) -> String {
        self.id.clone()
    }

    fn notify_state(&self, event: StateChangedEvent) {
        self.states.lock().unwrap().push(event);
    }

    fn notify_sending(&self, event: SendingEvent) {
        self.sending.lock().unwrap().push(event);
    }

    fn notify_receiving(&self, event: ReceivingEvent) {
        self.receiving.lock().unwrap().push(event);
    }
}
