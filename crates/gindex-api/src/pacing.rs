use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

/// Minimum spacing between requests to the shared upstream.
///
/// Each call to [`wait`](Self::wait) suspends only the calling stream for
/// `base` plus a random share of `jitter`. Independent streams are not
/// serialized against each other.
#[derive(Debug)]
pub struct RequestPacer {
    base: Duration,
    jitter: Duration,
    waits: AtomicU64,
}

impl RequestPacer {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self {
            base,
            jitter,
            waits: AtomicU64::new(0),
        }
    }

    /// A pacer that never sleeps but still counts waits.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub async fn wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
        let delay = self.base + jitter(self.jitter);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Number of times [`wait`](Self::wait) has been called.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

/// Uniform random duration in `[0, max]`, at millisecond resolution.
pub(crate) fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(Duration::from_millis(50)) <= Duration::from_millis(50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_at_least_base() {
        let pacer = RequestPacer::new(Duration::from_millis(500), Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        pacer.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed <= Duration::from_millis(700));
        assert_eq!(pacer.waits(), 1);
    }

    #[tokio::test]
    async fn test_disabled_counts_waits() {
        let pacer = RequestPacer::disabled();
        pacer.wait().await;
        pacer.wait().await;
        assert_eq!(pacer.waits(), 2);
    }
}
