//! Wire types exchanged between PeerDrop clients and the signaling relay,
//! and between two peers over their direct data channel.
//!
//! The protocol has three layers:
//! - Relay frames (`frame`): JSON text frames on the relay WebSocket.
//!   Clients send `join-room`, `relay` and `leave-room`; the relay answers
//!   with `joined-room`, `peer-joined`, `peer-left`, `relay` and `error`.
//! - Signals (`signal`): the connection-setup messages carried inside
//!   `relay` frames. They form a closed set, every payload is bounded, and
//!   decoding validates those bounds.
//! - Control messages (`control`): the text frames peers exchange on the
//!   data channel around the binary file chunks.
//!
//! The `DataChannel` trait abstracts the direct peer channel so the sender
//! and receiver pipelines can run over any transport.
//!
//! Example:
//! ```rust
//! use peerdropx_common::{ClientFrame, ErrorCode, Signal};
//!
//! let frame = ClientFrame::decode(
//!     r#"{"type":"join-room","transferId":"t-1","role":"sender","token":"s3cr3t"}"#,
//! )
//! .unwrap();
//! assert!(matches!(frame, ClientFrame::JoinRoom { .. }));
//!
//! let err = ClientFrame::decode(r#"{"type":"hello"}"#).unwrap_err();
//! assert_eq!(err.code, ErrorCode::UnknownType);
//!
//! let ready = Signal::decode(&serde_json::json!({"type": "ready"})).unwrap();
//! assert_eq!(ready, Signal::Ready);
//! ```

mod channel;
mod control;
mod error;
mod frame;
pub mod limits;
mod signal;

pub use channel::{DataChannel, TransportError};
pub use control::ControlMessage;
pub use error::{ErrorClass, ErrorCode, FrameError};
pub use frame::{ClientFrame, ClientMessage, JoinRequest, ServerMessage};
pub use signal::{IceCandidate, SessionDescription, Signal, SignalError};
