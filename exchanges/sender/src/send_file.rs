use peerdropx_common::{ControlMessage, DataChannel, TransportError};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::{ChunkConfig, OutgoingFile};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendingEvent {
    pub name: String,
    pub sent: u64,
    pub remaining: u64,
}

/// Offsets and lengths of the chunks `len` bytes split into.
pub fn chunk_plan(
    len: u64,
    chunk_size: u64,
) -> impl Iterator<Item = (u64, u64)> {
    let chunk_size = chunk_size.max(1);
    (0..len.div_ceil(chunk_size)).map(move |i| {
        let offset = i * chunk_size;
        (offset, chunk_size.min(len - offset))
    })
}

/// Sends `meta`, the file bytes as binary chunks, then `done`.
///
/// Before each chunk, if the channel has more than
/// [`ChunkConfig::high_water_mark`] bytes queued, waits for it to drain or
/// for [`ChunkConfig::drain_timeout`], whichever comes first. Returns the
/// number of bytes sent.
pub async fn send_file(
    channel: &dyn DataChannel,
    file: &OutgoingFile,
    config: &ChunkConfig,
    on_progress: impl Fn(SendingEvent) + Send + Sync,
) -> Result<u64, TransportError> {
    let total = file.size();
    info!("Sending {} ({} bytes)", file.name, total);

    channel
        .send_control(&ControlMessage::Meta {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size: total,
        })
        .await?;

    let mut sent = 0u64;
    on_progress(SendingEvent {
        name: file.name.clone(),
        sent,
        remaining: total,
    });

    for (offset, len) in chunk_plan(total, config.chunk_size) {
        if channel.buffered_amount() > config.high_water_mark {
            debug!(
                "Channel buffer at {} bytes, waiting for drain",
                channel.buffered_amount()
            );
            if timeout(config.drain_timeout, channel.drained()).await.is_err()
            {
                debug!("Drain wait timed out, sending anyway");
            }
        }

        let chunk = file.data.read_at(offset, len);
        if chunk.len() as u64 != len {
            return Err(TransportError::SendFailed(format!(
                "source returned {} bytes at offset {}, expected {}",
                chunk.len(),
                offset,
                len
            )));
        }
        channel.send_binary(chunk).await?;

        sent += len;
        on_progress(SendingEvent {
            name: file.name.clone(),
            sent,
            remaining: total - sent,
        });
    }

    channel.send_control(&ControlMessage::Done).await?;
    info!("Sent {} ({} bytes)", file.name, sent);
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_plan_splits_tail() {
        let lens: Vec<u64> =
            chunk_plan(150_000, 65_536).map(|(_, len)| len).collect();
        assert_eq!(lens, vec![65_536, 65_536, 18_928]);
    }

    #[test]
    fn test_chunk_plan_edges() {
        assert_eq!(chunk_plan(0, 65_536).count(), 0);
        assert_eq!(chunk_plan(65_536, 65_536).collect::<Vec<_>>(), vec![(
            0, 65_536
        )]);
        assert_eq!(
            chunk_plan(65_537, 65_536).collect::<Vec<_>>(),
            vec![(0, 65_536), (65_536, 1)]
        );
    }
}
