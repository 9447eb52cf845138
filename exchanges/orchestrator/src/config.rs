use std::time::Duration;

use peerdropx_receiver::ReceiverConfig;
use peerdropx_sender::ChunkConfig;

/// Tuning for one side of a transfer.
///
/// Use one of the presets (`default`, `balanced`, `local_network`,
/// `unreliable_network`) or override fields as needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// How long `connecting` may last before the attempt fails.
    pub connect_timeout: Duration,
    /// Largest file the sender will hand to the fallback uploader.
    pub fallback_ceiling: u64,
    pub reconnect_attempts: u32,
    /// Delay before the first relay reconnect, doubled on each retry.
    pub reconnect_base_delay: Duration,
    /// Requested session lifetime; the session service clamps it.
    pub ttl_minutes: Option<i64>,
    pub chunk: ChunkConfig,
    pub receiver: ReceiverConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            fallback_ceiling: 100 * 1024 * 1024, // 100MB
            reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_millis(500),
            ttl_minutes: None,
            chunk: ChunkConfig::default(),
            receiver: ReceiverConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Both peers on one LAN: fail fast, bigger chunks.
    pub fn local_network() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            chunk: ChunkConfig::high_throughput(),
            ..Self::default()
        }
    }

    /// Mobile or lossy links: more patience and smaller chunks.
    pub fn unreliable_network() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            chunk: ChunkConfig::low_bandwidth(),
            receiver: ReceiverConfig::constrained(),
            ..Self::default()
        }
    }

    /// Delay before reconnect `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.reconnect_base_delay.saturating_mul(1 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let config = OrchestratorConfig::default();
        let delays: Vec<u64> = (1..=3)
            .map(|n| config.reconnect_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000]);
    }

    #[test]
    fn test_presets_differ_from_default() {
        let default = OrchestratorConfig::default();
        assert_eq!(OrchestratorConfig::balanced(), default);
        assert!(
            OrchestratorConfig::local_network().connect_timeout
                < default.connect_timeout
        );
        let unreliable = OrchestratorConfig::unreliable_network();
        assert!(unreliable.reconnect_attempts > default.reconnect_attempts);
        assert!(unreliable.chunk.chunk_size < default.chunk.chunk_size);
    }
}
