use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Relay-wide counters, shared by every connection through the registry.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    connections_opened: AtomicU64,
    connections_active: AtomicU64,
    rooms_active: AtomicU64,
    frames_relayed: AtomicU64,
    frames_rejected: AtomicU64,
    rate_limit_closures: AtomicU64,
    rooms_expired: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_active: u64,
    pub rooms_active: u64,
    pub frames_relayed: u64,
    pub frames_rejected: u64,
    pub rate_limit_closures: u64,
    pub rooms_expired: u64,
}

impl RelayMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            rooms_active: self.rooms_active.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            rate_limit_closures: self
                .rate_limit_closures
                .load(Ordering::Relaxed),
            rooms_expired: self.rooms_expired.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        let _ = self.connections_active.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
    }

    pub(crate) fn room_created(&self) {
        self.rooms_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn room_deleted(&self) {
        let _ = self.rooms_active.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
    }

    pub(crate) fn frame_relayed(&self) {
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rate_limit_closure(&self) {
        self.rate_limit_closures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn room_expired(&self) {
        self.rooms_expired.fetch_add(1, Ordering::Relaxed);
    }
}
