//! One-shot timers that advance classroom lifecycle state at wall-clock
//! instants.
//!
//! The scheduler owns no business state: it maps `(classroom_id, kind)` to
//! a cancellable timer and runs the supplied future when the timer fires.
//! Re-scheduling a key supersedes (aborts) the previous timer; cancelling
//! an absent or already-fired key is a no-op. After a crash the map is
//! rebuilt from persisted classrooms by the restart recovery scan.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// Which lifecycle edge a timer drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Start,
    End,
}

struct TimerEntry {
    seq: u64,
    handle: JoinHandle<()>,
}

pub struct TransitionScheduler {
    clock: Arc<dyn Clock>,
    timers: Arc<Mutex<HashMap<(String, TransitionKind), TimerEntry>>>,
    next_seq: AtomicU64,
}

impl TransitionScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Registers a one-shot trigger for `(classroom_id, kind)` at
    /// `fire_at`, replacing any pending trigger for the same key. An
    /// instant already in the past fires immediately.
    pub async fn schedule<F, Fut>(
        &self,
        classroom_id: &str,
        kind: TransitionKind,
        fire_at: DateTime<Utc>,
        task: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = (fire_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = (classroom_id.to_string(), kind);

        tracing::debug!(
            classroom_id = %classroom_id,
            kind = ?kind,
            delay_secs = delay.as_secs(),
            "Scheduling transition"
        );

        // The lock is held across spawn+insert so the spawned task cannot
        // observe the map before its own entry exists.
        let mut timers = self.timers.lock().await;

        let shared_timers = Arc::clone(&self.timers);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Remove our own entry; bail out if a newer timer took the key.
            {
                let mut timers = shared_timers.lock().await;
                match timers.get(&task_key) {
                    Some(entry) if entry.seq == seq => {
                        timers.remove(&task_key);
                    }
                    _ => return,
                }
            }

            task().await;
        });

        if let Some(old) = timers.insert(key, TimerEntry { seq, handle }) {
            old.handle.abort();
        }
    }

    /// Disarms the pending trigger for `(classroom_id, kind)`. Safe to call
    /// when none is pending.
    pub async fn cancel(&self, classroom_id: &str, kind: TransitionKind) {
        let mut timers = self.timers.lock().await;
        if let Some(entry) = timers.remove(&(classroom_id.to_string(), kind)) {
            entry.handle.abort();
            tracing::debug!(classroom_id = %classroom_id, kind = ?kind, "Cancelled transition");
        }
    }

    /// Disarms both triggers of a classroom
    pub async fn cancel_all(&self, classroom_id: &str) {
        self.cancel(classroom_id, TransitionKind::Start).await;
        self.cancel(classroom_id, TransitionKind::End).await;
    }

    pub async fn is_scheduled(&self, classroom_id: &str, kind: TransitionKind) -> bool {
        let timers = self.timers.lock().await;
        timers.contains_key(&(classroom_id.to_string(), kind))
    }

    pub async fn pending_count(&self) -> usize {
        let timers = self.timers.lock().await;
        timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    fn scheduler_at(now: DateTime<Utc>) -> Arc<TransitionScheduler> {
        TransitionScheduler::new(Arc::new(ManualClock::new(now)))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_instant() {
        let now = Utc::now();
        let scheduler = scheduler_at(now);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler
            .schedule("c1", TransitionKind::Start, now + chrono::Duration::hours(1), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(scheduler.is_scheduled("c1", TransitionKind::Start).await);

        tokio::time::sleep(Duration::from_secs(3601)).await;
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("c1", TransitionKind::Start).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_instant_fires_immediately() {
        let now = Utc::now();
        let scheduler = scheduler_at(now);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler
            .schedule("c1", TransitionKind::End, now - chrono::Duration::minutes(5), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms() {
        let now = Utc::now();
        let scheduler = scheduler_at(now);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        scheduler
            .schedule("c1", TransitionKind::Start, now + chrono::Duration::hours(1), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        scheduler.cancel("c1", TransitionKind::Start).await;

        tokio::time::sleep(Duration::from_secs(7200)).await;
        settle().await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        // Cancelling again (or a never-scheduled key) is harmless
        scheduler.cancel("c1", TransitionKind::Start).await;
        scheduler.cancel("c9", TransitionKind::End).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_supersedes() {
        let now = Utc::now();
        let scheduler = scheduler_at(now);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        scheduler
            .schedule("c1", TransitionKind::Start, now + chrono::Duration::hours(1), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let counter = second.clone();
        scheduler
            .schedule("c1", TransitionKind::Start, now + chrono::Duration::hours(2), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(scheduler.pending_count().await, 1);

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let now = Utc::now();
        let scheduler = scheduler_at(now);
        let fired = Arc::new(AtomicUsize::new(0));

        for kind in [TransitionKind::Start, TransitionKind::End] {
            let counter = fired.clone();
            scheduler
                .schedule("c1", kind, now + chrono::Duration::minutes(30), move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        assert_eq!(scheduler.pending_count().await, 2);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending_count().await, 0);
    }
}
