//! One-shot expiry timers keyed by record.
//!
//! Timers live only in memory. Anything that must survive a restart is stored
//! in the database and re-armed at startup (see `main.rs`). Jobs re-read their
//! record when they fire and use [`is_due`] to skip stale work.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Slack allowed between the timer firing and the stored due time.
const DUE_TOLERANCE_MS: i64 = 1_000;

struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct ExpiryScheduler<K> {
    name: &'static str,
    timers: Arc<Mutex<HashMap<K, Armed>>>,
    generation: Arc<AtomicU64>,
}

impl<K> ExpiryScheduler<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs `job` at `due_at` (immediately if already past), replacing any
    /// timer already armed for `key`.
    pub fn arm<F, Fut>(&self, key: K, due_at: DateTime<Utc>, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = (due_at - Utc::now()).to_std().unwrap_or_default();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let Ok(mut timers) = self.timers.lock() else {
            warn!("{} scheduler lock poisoned, dropping timer for {:?}", self.name, key);
            return;
        };

        let registry = Arc::clone(&self.timers);
        let task_key = key.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if let Ok(mut timers) = registry.lock() {
                if timers.get(&task_key).map(|a| a.generation) == Some(generation) {
                    timers.remove(&task_key);
                }
            }
            debug!("{} timer fired for {:?}", name, task_key);
            job().await;
        });

        if let Some(previous) = timers.insert(key.clone(), Armed { generation, handle }) {
            previous.handle.abort();
            debug!("{} timer for {:?} re-armed", self.name, key);
        }
        debug!("{} timer armed for {:?} in {:?}", self.name, key, delay);
    }

    /// Cancels the pending timer for `key`. Returns whether one was armed.
    pub fn disarm(&self, key: &K) -> bool {
        let Ok(mut timers) = self.timers.lock() else {
            return false;
        };
        match timers.remove(key) {
            Some(armed) => {
                armed.handle.abort();
                debug!("{} timer for {:?} disarmed", self.name, key);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.timers
            .lock()
            .map(|timers| timers.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a job that fired at `now` should act on a record due at `due_at`.
///
/// `None` means the record was removed. A due time in the future means a newer
/// timer superseded this one.
pub fn is_due(due_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match due_at {
        Some(due) => due <= now + Duration::milliseconds(DUE_TOLERANCE_MS),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn counter_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    async fn settle(secs: u64) {
        tokio::time::sleep(StdDuration::from_secs(secs)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_at_due_time() {
        let scheduler = ExpiryScheduler::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(1u64, Utc::now() + Duration::seconds(10), counter_job(&fired));
        assert!(scheduler.is_armed(&1));

        settle(5).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        settle(6).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed(&1));

        settle(60).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_due_fires_immediately() {
        let scheduler = ExpiryScheduler::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(1u64, Utc::now() - Duration::hours(1), counter_job(&fired));
        settle(0).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = ExpiryScheduler::new("test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler.arm(1u64, Utc::now() + Duration::seconds(5), counter_job(&first));
        scheduler.arm(1u64, Utc::now() + Duration::seconds(20), counter_job(&second));
        assert_eq!(scheduler.len(), 1);

        settle(10).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        settle(15).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let scheduler = ExpiryScheduler::new("test");
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(1u64, Utc::now() + Duration::seconds(5), counter_job(&fired));
        assert!(scheduler.disarm(&1));
        assert!(!scheduler.disarm(&1));

        settle(10).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(!is_due(None, now));
        assert!(is_due(Some(now - Duration::minutes(1)), now));
        assert!(is_due(Some(now + Duration::milliseconds(500)), now));
        assert!(!is_due(Some(now + Duration::hours(2)), now));
    }
}
