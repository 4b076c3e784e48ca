//! Delayed task scheduling for window expiry
//!
//! The admission gate never sleeps on its own; it hands each expiry to a
//! [`Scheduler`]. Production code uses [`TokioScheduler`], tests can use
//! [`ManualScheduler`] to move a virtual clock forward explicitly.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};

/// A task run once when its delay elapses
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs fire-and-forget tasks after a delay
///
/// Scheduled tasks cannot be cancelled. Tasks still pending when the
/// scheduler goes away are simply never run.
pub trait Scheduler: Send + Sync + Debug {
    fn schedule(&self, delay: Duration, task: ScheduledTask);
}

/// Scheduler backed by tokio timers
///
/// Each task becomes a spawned future that sleeps for the delay and then runs
/// the task. Under a paused tokio clock the delay is virtual.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is currently running on
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/// Scheduler driven by an explicit virtual clock
///
/// Nothing runs until [`ManualScheduler::advance`] moves the clock past a
/// task's deadline. Clones share the same clock and queue.
///
/// ```
/// use mailgate::alerts::{ManualScheduler, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&fired);
/// scheduler.schedule(Duration::from_secs(60), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// scheduler.advance(Duration::from_secs(59));
/// assert!(!fired.load(Ordering::SeqCst));
/// scheduler.advance(Duration::from_secs(1));
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualClock>>,
}

#[derive(Default)]
struct ManualClock {
    elapsed: Duration,
    next_seq: u64,
    pending: Vec<PendingTask>,
}

struct PendingTask {
    due: Duration,
    seq: u64,
    task: ScheduledTask,
}

impl Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward and run every task that became due
    ///
    /// Tasks run in deadline order (ties in scheduling order) on the calling
    /// thread, after the internal lock has been released, so a task may
    /// schedule further work.
    ///
    /// # Returns
    ///
    /// Number of tasks that ran
    pub fn advance(&self, by: Duration) -> usize {
        let mut due = {
            let mut clock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            clock.elapsed += by;
            let now = clock.elapsed;
            let (ready, waiting): (Vec<_>, Vec<_>) =
                clock.pending.drain(..).partition(|p| p.due <= now);
            clock.pending = waiting;
            ready
        };
        due.sort_by_key(|p| (p.due, p.seq));

        let count = due.len();
        for pending in due {
            (pending.task)();
        }
        count
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed
    }

    /// Number of tasks still waiting for their deadline
    pub fn pending_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) {
        let mut clock = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let due = clock.elapsed + delay;
        let seq = clock.next_seq;
        clock.next_seq += 1;
        clock.pending.push(PendingTask { due, seq, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_manual_scheduler_runs_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, secs) in [("late", 30), ("early", 10), ("tie", 10)] {
            let order = Arc::clone(&order);
            scheduler.schedule(
                Duration::from_secs(secs),
                Box::new(move || order.lock().unwrap().push(label)),
            );
        }

        assert_eq!(scheduler.pending_count(), 3);
        assert_eq!(scheduler.advance(Duration::from_secs(30)), 3);
        assert_eq!(*order.lock().unwrap(), vec!["early", "tie", "late"]);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_manual_scheduler_deadline_is_relative_to_schedule_time() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.advance(Duration::from_secs(100));
        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_secs(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_secs(9)), 0);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.elapsed(), Duration::from_secs(110));
    }

    #[test]
    fn test_manual_scheduler_task_may_reschedule() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_scheduler = scheduler.clone();
        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let counter = Arc::clone(&counter);
                inner_scheduler.schedule(
                    Duration::from_secs(1),
                    Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_count(), 1);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        scheduler.schedule(
            Duration::from_secs(3600),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokio_scheduler_requires_runtime() {
        assert!(TokioScheduler::try_current().is_err());
    }
}
