//! Minimum-spacing rate limiter for outbound calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive [`acquire`](Self::acquire)
/// returns. Callers queue on the internal lock, so concurrent callers are
/// spaced as well.
#[derive(Debug)]
pub struct RateLimiter {
    spacing: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Mutex::new(None),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Wait until at least `spacing` has elapsed since the previous acquire.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.spacing).await;
        }
        *last = Some(Instant::now());
    }
}
