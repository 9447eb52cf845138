//! Byte source abstraction for the file being transferred.
//!
//! The `Data` trait models a thread-safe, read-only source of bytes with a
//! known total length. Reads are positional and non-consuming, so the same
//! source can feed the direct channel and, after a failure, the fallback
//! upload without being reopened.

use std::sync::Arc;

/// A thread-safe, random-access source of bytes.
///
/// Contract:
/// - `len()` returns the total length in bytes and never changes over the
///   lifetime of the object.
/// - `read_at(offset, size)` returns up to `size` bytes starting at
///   `offset`. It returns fewer bytes near the end and an empty `Vec` when
///   `offset >= len()` or `size == 0`.
pub trait Data: Send + Sync {
    /// Total length of the data in bytes.
    fn len(&self) -> u64;

    /// Checks if the data is empty (length is 0).
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads up to `size` bytes starting at `offset`.
    fn read_at(&self, offset: u64, size: u64) -> Vec<u8>;

    /// Reads the whole source into memory.
    fn read_all(&self) -> Vec<u8> {
        self.read_at(0, self.len())
    }
}

/// In-memory `Data` backed by a shared buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryData {
    bytes: Arc<[u8]>,
}

impl MemoryData {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }
}

impl Data for MemoryData {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, size: u64) -> Vec<u8> {
        let len = self.bytes.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        let end = start.saturating_add(size).min(len);
        self.bytes[start..end].to_vec()
    }
}

impl From<Vec<u8>> for MemoryData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
