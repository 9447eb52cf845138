//! Room table of the signaling relay.
//!
//! A room pairs the two connections of one transfer. Rooms live only in
//! memory and only as long as someone is in them: a room is created by the
//! first `join-room` for its transfer id and deleted the moment both slots
//! are empty, or by the idle sweep.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use peerdrop_entities::Role;
use peerdropx_common::{ErrorCode, JoinRequest, ServerMessage, Signal};
use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};
use tracing::{debug, info};

use crate::RelayMetrics;

pub type ConnId = u64;

/// Effects a connection's writer task applies to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(ServerMessage),
    Close,
}

/// Write half of one relay connection.
#[derive(Debug, Clone)]
pub struct PeerSink {
    id: ConnId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PeerSink {
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queues a frame. Returns `false` once the writer is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(Outbound::Frame(message)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

#[derive(Debug)]
struct Slot {
    sink: PeerSink,
    token: String,
}

#[derive(Debug)]
struct Room {
    sender: Option<Slot>,
    receiver: Option<Slot>,
    created_at: Instant,
    touched_at: Instant,
}

impl Room {
    fn new(now: Instant) -> Self {
        Self {
            sender: None,
            receiver: None,
            created_at: now,
            touched_at: now,
        }
    }

    fn slot(&self, role: Role) -> &Option<Slot> {
        match role {
            Role::Sender => &self.sender,
            Role::Receiver => &self.receiver,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<Slot> {
        match role {
            Role::Sender => &mut self.sender,
            Role::Receiver => &mut self.receiver,
        }
    }

    fn owned_by(&self, role: Role, conn: ConnId) -> bool {
        self.slot(role).as_ref().is_some_and(|s| s.sink.id() == conn)
    }

    fn is_empty(&self) -> bool {
        self.sender.is_none() && self.receiver.is_none()
    }

    fn occupants(&self) -> impl Iterator<Item = (Role, &Slot)> {
        [(Role::Sender, &self.sender), (Role::Receiver, &self.receiver)]
            .into_iter()
            .filter_map(|(role, slot)| slot.as_ref().map(|s| (role, s)))
    }
}

macro_rules! room_event {
    ($registry:expr, $($arg:tt)+) => {
        if $registry.log_events {
            info!($($arg)+);
        } else {
            debug!($($arg)+);
        }
    };
}

/// Owns every room and the relay counters.
///
/// One instance is built at startup and handed to each connection as an
/// `Arc<Registry>`. The room table sits behind a single async mutex, which
/// serializes room creation, slot assignment and deletion.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: Mutex<HashMap<String, Room>>,
    metrics: RelayMetrics,
    next_conn: AtomicU64,
    log_events: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs joins, leaves, relays and expiries at `info` instead of `debug`.
    pub fn with_event_logging(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Registers a new connection and returns its sink.
    pub fn open_connection(
        &self,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> PeerSink {
        let id = self.next_conn.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.connection_opened();
        debug!("Connection {} opened", id);
        PeerSink { id, tx }
    }

    pub fn connection_closed(&self, conn: ConnId) {
        self.metrics.connection_closed();
        debug!("Connection {} closed", conn);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Whether the room for `transfer_id` has an occupant in `role`.
    pub async fn is_occupied(&self, transfer_id: &str, role: Role) -> bool {
        self.rooms
            .lock()
            .await
            .get(transfer_id)
            .is_some_and(|room| room.slot(role).is_some())
    }

    /// Binds `sink` to the requested slot.
    ///
    /// A slot held under a different token fails with `role-taken`. A slot
    /// held under the same token by another connection is handed over and
    /// the stale connection is closed.
    pub async fn join(
        &self,
        sink: &PeerSink,
        request: &JoinRequest,
    ) -> Result<(), ErrorCode> {
        let now = Instant::now();
        let mut rooms = self.rooms.lock().await;
        let created = !rooms.contains_key(&request.transfer_id);
        let room = rooms
            .entry(request.transfer_id.clone())
            .or_insert_with(|| Room::new(now));

        let role = request.role;
        match room.slot(role) {
            Some(slot) if slot.token != request.token => {
                return Err(ErrorCode::RoleTaken);
            }
            Some(slot) if slot.sink.id() != sink.id() => {
                room_event!(
                    self,
                    "Replacing stale {} connection {} in room {}",
                    role,
                    slot.sink.id(),
                    request.transfer_id
                );
                slot.sink.close();
            }
            _ => {}
        }
        if created {
            self.metrics.room_created();
        }
        *room.slot_mut(role) = Some(Slot {
            sink: sink.clone(),
            token: request.token.clone(),
        });
        room.touched_at = now;

        let peer = room.slot(role.peer()).as_ref();
        sink.send(ServerMessage::JoinedRoom {
            role,
            peer_present: peer.is_some(),
        });
        if let Some(peer) = peer {
            sink.send(ServerMessage::PeerJoined {
                role,
                peer_role: role.peer(),
            });
            peer.sink.send(ServerMessage::PeerJoined {
                role: role.peer(),
                peer_role: role,
            });
        }
        room_event!(
            self,
            "Connection {} joined room {} as {} (peer present: {})",
            sink.id(),
            request.transfer_id,
            role,
            peer.is_some()
        );
        Ok(())
    }

    /// Forwards `signal` from the bound connection to its peer.
    pub async fn relay(
        &self,
        sink: &PeerSink,
        binding: &JoinRequest,
        signal: Signal,
    ) -> Result<(), ErrorCode> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(&binding.transfer_id)
            .ok_or(ErrorCode::MissingRoom)?;
        if !room.owned_by(binding.role, sink.id()) {
            return Err(ErrorCode::NotJoined);
        }
        let peer = room
            .slot(binding.role.peer())
            .as_ref()
            .ok_or(ErrorCode::PeerMissing)?;

        let kind = signal.kind();
        peer.sink.send(ServerMessage::Relay {
            role: binding.role.peer(),
            from: binding.role,
            signal,
        });
        room.touched_at = Instant::now();
        self.metrics.frame_relayed();
        room_event!(
            self,
            "Relayed {} from {} in room {}",
            kind,
            binding.role,
            binding.transfer_id
        );
        Ok(())
    }

    /// Clears the bound slot and tells the peer.
    pub async fn leave(
        &self,
        conn: ConnId,
        binding: &JoinRequest,
    ) -> Result<(), ErrorCode> {
        let mut rooms = self.rooms.lock().await;
        let room = rooms
            .get_mut(&binding.transfer_id)
            .ok_or(ErrorCode::MissingRoom)?;
        if !room.owned_by(binding.role, conn) {
            return Err(ErrorCode::NotJoined);
        }

        *room.slot_mut(binding.role) = None;
        room.touched_at = Instant::now();
        if let Some(peer) = room.slot(binding.role.peer()) {
            peer.sink.send(ServerMessage::PeerLeft {
                role: binding.role.peer(),
                peer_role: binding.role,
            });
        }
        room_event!(
            self,
            "Connection {} left room {} ({})",
            conn,
            binding.transfer_id,
            binding.role
        );

        if room.is_empty() {
            rooms.remove(&binding.transfer_id);
            self.metrics.room_deleted();
            room_event!(self, "Room {} deleted", binding.transfer_id);
        }
        Ok(())
    }

    /// Same as [`Registry::leave`] for a connection that is gone. Does
    /// nothing when the connection no longer owns the slot.
    pub async fn disconnect(&self, conn: ConnId, binding: &JoinRequest) {
        if let Err(code) = self.leave(conn, binding).await {
            debug!(
                "Connection {} had no slot to release in {}: {}",
                conn, binding.transfer_id, code
            );
        }
    }

    /// Deletes rooms idle for longer than `idle_ttl`. Each occupant first
    /// receives a `room-expired` error, then its connection is closed.
    pub async fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize {
        let mut rooms = self.rooms.lock().await;
        let expired: Vec<String> = rooms
            .iter()
            .filter(|(_, room)| now.duration_since(room.touched_at) > idle_ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for transfer_id in &expired {
            let Some(room) = rooms.remove(transfer_id) else {
                continue;
            };
            for (role, slot) in room.occupants() {
                slot.sink.send(ServerMessage::error(
                    ErrorCode::RoomExpired,
                    "room expired after inactivity",
                ));
                slot.sink.close();
                debug!("Closed {} in expired room {}", role, transfer_id);
            }
            self.metrics.room_deleted();
            self.metrics.room_expired();
            room_event!(
                self,
                "Room {} expired after {:?} (created {:?} ago)",
                transfer_id,
                now.duration_since(room.touched_at),
                now.duration_since(room.created_at)
            );
        }
        expired.len()
    }
}
