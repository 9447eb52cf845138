//! Domain models shared by every PeerDrop crate.
//!
//! This crate provides:
//! - `Data`: a thread-safe, random-access byte source for the file being
//!   transferred, with `MemoryData` as the in-memory implementation.
//! - `Role`: the two participants of a transfer (sender and receiver).
//! - `TransferCode`: the human-shareable `XXXX-XXXX` code of a session.
//! - `TransferSession` and `SessionState`: the ephemeral session record
//!   issued by the session store.
//!
//! Example:
//! ```rust
//! use peerdrop_entities::{Data, MemoryData, Role, TransferCode};
//!
//! let data = MemoryData::new(b"hello".to_vec());
//! assert_eq!(data.len(), 5);
//! assert_eq!(data.read_at(1, 3), b"ell".to_vec());
//!
//! assert_eq!(Role::Sender.peer(), Role::Receiver);
//!
//! let code = TransferCode::parse(" ab12-cd34 ").unwrap();
//! assert_eq!(code.as_str(), "AB12-CD34");
//! ```

mod code;
mod data;
mod role;
mod session;

/// Re-export of the transfer code newtype and its parse error.
pub use code::{InvalidTransferCode, TransferCode};
/// Re-export of the byte source trait and its in-memory implementation.
pub use data::{Data, MemoryData};
/// Re-export of the participant role.
pub use role::{ParseRoleError, Role};
/// Re-export of the session record.
pub use session::{SessionState, TransferSession};
