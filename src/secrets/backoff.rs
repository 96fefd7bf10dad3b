//! Retry backoff for failed providers
//!
//! [`BackoffPolicy`] computes the capped exponential delay sequence and
//! [`RetryScheduler`] keeps at most one pending retry timer per provider name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(300))
    }
}

impl BackoffPolicy {
    /// Create a policy. `max` is raised to `initial` if it is smaller.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max: max.max(initial) }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to use after a retry that waited `current`
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }

    /// The full delay sequence starting at `initial`
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.initial), move |d| Some(self.next(*d)))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct RetryTimer {
    id: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

/// One-shot retry timers keyed by provider name
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler {
    timers: Arc<Mutex<HashMap<String, RetryTimer>>>,
    next_id: Arc<AtomicU64>,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RetryTimer>> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `on_fire` after `delay`, replacing any timer pending for `name`.
    ///
    /// A timer clears its own slot before running `on_fire`, so `on_fire` may
    /// schedule the next retry for the same name.
    pub fn schedule<F, Fut>(&self, name: &str, delay: Duration, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let key = name.to_string();

        let mut guard = self.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if timers.get(&key).map(|t| t.id) != Some(id) {
                    return;
                }
                timers.remove(&key);
            }
            on_fire().await;
        });

        if let Some(previous) = guard.insert(name.to_string(), RetryTimer { id, delay, handle }) {
            debug!(provider = %name, previous_delay_ms = millis(previous.delay), "Replacing pending retry");
            previous.handle.abort();
        }
        debug!(provider = %name, delay_ms = millis(delay), "Scheduled provider retry");
    }

    /// Cancel the pending retry for `name`, if any
    pub fn cancel(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending retry
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (name, timer) in drained {
            debug!(provider = %name, "Cancelling pending retry");
            timer.handle.abort();
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Delay of the pending retry for `name`
    pub fn pending_delay(&self, name: &str) -> Option<Duration> {
        self.lock().get(name).map(|t| t.delay)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() -> std::future::Ready<()> + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        })
    }

    #[test]
    fn test_delay_sequence_doubles_and_caps() {
        let policy = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(60));
        let delays: Vec<u64> = policy.delays().take(5).map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial(), Duration::from_secs(10));
        assert_eq!(policy.max(), Duration::from_secs(300));
    }

    #[test]
    fn test_max_never_below_initial() {
        let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.max(), Duration::from_secs(5));
        assert_eq!(policy.next(Duration::from_secs(5)), Duration::from_secs(5));
    }

    proptest! {
        #[test]
        fn prop_delays_monotonic_and_bounded(initial_ms in 1u64..100_000, max_ms in 1u64..1_000_000) {
            let policy = BackoffPolicy::new(Duration::from_millis(initial_ms), Duration::from_millis(max_ms));
            let delays: Vec<Duration> = policy.delays().take(40).collect();

            prop_assert_eq!(delays[0], policy.initial());
            for pair in delays.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
                prop_assert_eq!(pair[1], (pair[0] * 2).min(policy.max()));
            }
            prop_assert!(delays.iter().all(|d| *d <= policy.max()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_clears_slot() {
        let scheduler = RetryScheduler::new();
        let (count, on_fire) = counter();

        scheduler.schedule("vault", Duration::from_secs(10), on_fire);
        assert!(scheduler.is_pending("vault"));
        assert_eq!(scheduler.pending_delay("vault"), Some(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending("vault"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_timer() {
        let scheduler = RetryScheduler::new();
        let (first, on_first) = counter();
        let (second, on_second) = counter();

        scheduler.schedule("vault", Duration::from_secs(10), on_first);
        scheduler.schedule("vault", Duration::from_secs(20), on_second);
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = RetryScheduler::new();
        let (a, on_a) = counter();
        let (b, on_b) = counter();

        scheduler.schedule("env", Duration::from_secs(1), on_a);
        scheduler.schedule("vault", Duration::from_secs(1), on_b);
        assert_eq!(scheduler.pending_count(), 2);

        scheduler.cancel_all();
        assert_eq!(scheduler.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single() {
        let scheduler = RetryScheduler::new();
        let (count, on_fire) = counter();

        scheduler.schedule("env", Duration::from_secs(1), on_fire);
        assert!(scheduler.cancel("env"));
        assert!(!scheduler.cancel("env"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
