//! Per-key circuit breaker for background revalidation.
//!
//! After `threshold` consecutive failures for a key, background refreshes of
//! that key are suspended for `cooldown`. Once the cooldown passes one attempt
//! is let through; another failure reopens the breaker immediately, a success
//! resets it.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Default)]
struct KeyState {
    failures: u32,
    open_until: Option<Instant>,
}

pub struct RevalidationBreaker {
    keys: DashMap<String, KeyState>,
    threshold: u32,
    cooldown: Duration,
}

impl RevalidationBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        RevalidationBreaker {
            keys: DashMap::new(),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Whether a background refresh of `key` may run now.
    pub fn allows(&self, key: &str) -> bool {
        self.keys
            .get(key)
            .and_then(|state| state.open_until)
            .map_or(true, |until| Instant::now() >= until)
    }

    pub fn record_success(&self, key: &str) {
        self.keys.remove(key);
    }

    pub fn record_failure(&self, key: &str) {
        let mut state = self.keys.entry(key.to_string()).or_default();
        state.failures += 1;
        if state.failures >= self.threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            warn!(
                "Background refresh for {} suspended for {:?} after {} failures",
                key, self.cooldown, state.failures
            );
        }
    }

    pub fn clear(&self) {
        self.keys.clear();
    }
}

impl Default for RevalidationBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_half_opens() {
        let breaker = RevalidationBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure("k");
        breaker.record_failure("k");
        assert!(breaker.allows("k"));

        breaker.record_failure("k");
        assert!(!breaker.allows("k"));
        assert!(breaker.allows("other"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.allows("k"));

        // Half-open: one more failure reopens
        breaker.record_failure("k");
        assert!(!breaker.allows("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let breaker = RevalidationBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure("k");
        breaker.record_success("k");
        breaker.record_failure("k");
        assert!(breaker.allows("k"));
    }
}
