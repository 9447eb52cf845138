//! PeerDrop signaling relay.
//!
//! The relay pairs the sender and receiver of a transfer in a room and
//! forwards connection-setup signals between them, so they can open a
//! direct channel. It never sees file bytes. It also serves the session
//! HTTP API that issues transfer codes and tokens.
//!
//! Pieces:
//! - [`Registry`]: the room table and relay counters, one per process.
//! - [`Connection`]: the per-socket state machine, driven by
//!   [`Inbound`] events through [`Connection::dispatch`].
//! - [`SlidingWindow`]: the per-connection message rate limiter.
//! - [`spawn_sweeper`]: deletes rooms that have been idle too long.
//! - [`RelayServer`]: the axum server exposing `/ws`, `/health`, `/stats`
//!   and `/api/transfers`.
//! - [`RelayConfig`]: layered configuration (defaults, TOML, environment,
//!   CLI).

pub mod cli;
mod config;
mod connection;
mod metrics;
mod rate_limit;
mod registry;
mod server;
mod sweeper;

pub use config::{RelayConfig, SessionSection};
pub use connection::{Connection, ConnectionLimits, Flow, Inbound};
pub use metrics::{MetricsSnapshot, RelayMetrics};
pub use rate_limit::SlidingWindow;
pub use registry::{ConnId, Outbound, PeerSink, Registry};
pub use server::{AppState, RelayServer, router};
pub use sweeper::spawn_sweeper;
