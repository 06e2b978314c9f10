//! Async request pacing between Bugzilla API hits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

/// Enforces a minimum cooldown interval between consecutive requests so a
/// paginating caller cannot hammer the remote.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Waits out whatever remains of the cooldown, then records this call.
    pub async fn hit(&self) {
        let mut guard = self.last_call.lock().await;
        if let Some(last) = *guard {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                sleep(self.cooldown - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
