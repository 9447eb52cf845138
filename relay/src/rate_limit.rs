use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

/// Sliding-window message limiter for one connection.
///
/// Keeps the timestamps of admitted messages that are still inside the
/// window. Rejected messages are not recorded.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: VecDeque::with_capacity(limit.min(1024)),
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
        if self.hits.len() >= self.limit {
            return false;
        }
        self.hits.push_back(now);
        true
    }
}
