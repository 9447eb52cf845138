use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::info;

use crate::Registry;

/// Periodically deletes rooms idle for longer than `idle_ttl`.
pub fn spawn_sweeper(
    registry: Arc<Registry>,
    every: Duration,
    idle_ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let expired = registry.sweep(Instant::now(), idle_ttl).await;
            if expired > 0 {
                info!("Swept {} idle rooms", expired);
            }
        }
    })
}
