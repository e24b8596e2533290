use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum interval between the starts of consecutive requests,
/// across every worker sharing the limiter.
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may start. Holding the lock while
    /// sleeping queues callers in arrival order.
    pub async fn acquire(&self) {
        let mut last_start = self.last_start.lock().await;
        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last_start = Some(Instant::now());
    }
}
