// Request pacing for remote inference endpoints.
//
// Hosted model endpoints usually cap queries per second. Callers await
// `acquire` before each request; consecutive requests are spaced at least
// 1/qps apart. The lock is released before sleeping so waiters queue up
// behind the next free slot rather than behind each other's sleeps.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Pacing>>,
}

struct Pacing {
    interval: Duration,
    /// Earliest instant the next request may start
    next_slot: Option<Instant>,
}

impl RateLimiter {
    /// A non-positive rate disables pacing.
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            inner: Arc::new(Mutex::new(Pacing {
                interval,
                next_slot: None,
            })),
        }
    }

    pub async fn interval(&self) -> Duration {
        self.inner.lock().await.interval
    }

    /// Reserve the next slot and wait for it.
    pub async fn acquire(&self) {
        let wait_until = {
            let mut pacing = self.inner.lock().await;
            let now = Instant::now();
            let slot = match pacing.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            pacing.next_slot = Some(slot + pacing.interval);
            slot
        };

        if wait_until > Instant::now() {
            tokio::time::sleep_until(wait_until).await;
        }
    }
}
