mod fallback;
mod send_file;

use peerdrop_entities::Data;
use std::{sync::Arc, time::Duration};

pub use fallback::{FallbackReceipt, FallbackUploader};
pub use send_file::{SendingEvent, chunk_plan, send_file};

/// A file offered by the sender.
#[derive(Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub data: Arc<dyn Data>,
}

impl OutgoingFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Arc<dyn Data>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len()
    }
}

impl std::fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.size())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: u64,
    /// Buffered bytes above which the sender waits for the channel to drain.
    pub high_water_mark: u64,
    pub drain_timeout: Duration,
}
impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 65536,          // 64KB chunks
            high_water_mark: 1048576,   // 1MB queued before waiting
            drain_timeout: Duration::from_millis(750),
        }
    }
}
impl ChunkConfig {
    pub fn high_throughput() -> Self {
        Self {
            chunk_size: 262144,         // 256KB chunks
            high_water_mark: 4194304,   // 4MB queued
            drain_timeout: Duration::from_millis(750),
        }
    }

    pub fn balanced() -> Self {
        Self::default()
    }

    pub fn low_bandwidth() -> Self {
        Self {
            chunk_size: 16384,          // 16KB chunks
            high_water_mark: 262144,    // 256KB queued
            drain_timeout: Duration::from_millis(1500),
        }
    }
}
