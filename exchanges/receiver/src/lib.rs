//! Receive-side library for PeerDrop transfers.
//!
//! The sender announces the file with a `meta` control message, streams the
//! bytes as binary frames and closes with `done`. A [`Reassembler`] follows
//! that sequence on the receiving end:
//! 1. Feed every control message to [`Reassembler::on_control`] and every
//!    binary frame to [`Reassembler::on_chunk`].
//! 2. `on_chunk` returns a [`ReceivingEvent`] for progress reporting.
//! 3. `done` yields the [`ReceivedFile`] once the byte count matches the
//!    size declared in `meta`.
//!
//! Example:
//! ```rust
//! use peerdropx_common::ControlMessage;
//! use peerdropx_receiver::{Reassembler, ReceiveStep};
//!
//! let mut reassembler = Reassembler::default();
//! reassembler
//!     .on_control(ControlMessage::Meta {
//!         name: "note.txt".into(),
//!         mime_type: "text/plain".into(),
//!         size: 5,
//!     })
//!     .unwrap();
//! reassembler.on_chunk(b"hel").unwrap();
//! reassembler.on_chunk(b"lo").unwrap();
//! let ReceiveStep::Finished(file) =
//!     reassembler.on_control(ControlMessage::Done).unwrap()
//! else {
//!     panic!("expected a finished file");
//! };
//! assert_eq!(file.bytes, b"hello");
//! ```

mod reassembler;

pub use reassembler::*;

/// Limits applied to an incoming file.
///
/// Use one of the presets (`default`, `constrained`) or override fields as
/// needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Largest `meta.size` the receiver accepts.
    pub max_file_size: u64,
    /// Upper bound for the buffer reserved up front from `meta.size`.
    pub preallocate_limit: u64,
}

impl Default for ReceiverConfig {
    /// Accepts files up to 4 GiB and reserves at most 64 MiB up front.
    fn default() -> Self {
        Self {
            max_file_size: 4 * 1024 * 1024 * 1024,
            preallocate_limit: 64 * 1024 * 1024,
        }
    }
}

impl ReceiverConfig {
    /// Preset for memory-constrained devices: 512 MiB files, 8 MiB reserve.
    pub fn constrained() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024,
            preallocate_limit: 8 * 1024 * 1024,
        }
    }
}
