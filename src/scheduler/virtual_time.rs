//! Deterministic scheduler with a manually advanced clock.
//!
//! Time only moves when the test says so. Due tasks run in order of their
//! due time, ties broken by scheduling order, and the clock reads each
//! task's due time while it runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use super::{lock, Scheduler, Task, TimerId, Timestamp};

#[derive(Default)]
struct Inner {
    now: Timestamp,
    next_id: u64,
    /// Pending tasks keyed by (due time, scheduling order).
    queue: BTreeMap<(Timestamp, u64), Task>,
    /// Due time of every pending task, for cancellation.
    due: HashMap<TimerId, Timestamp>,
}

/// Virtual-time scheduler for tests.
#[derive(Default)]
pub struct VirtualScheduler {
    inner: Mutex<Inner>,
}

impl VirtualScheduler {
    /// Create a scheduler whose clock reads zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `delta`, running every task due on the way.
    pub fn advance_by(&self, delta: Duration) {
        let target = lock(&self.inner).now + delta;
        self.advance_to(target);
    }

    /// Move the clock to `target`, running every task due at or before it.
    ///
    /// A target in the past only runs tasks already due.
    pub fn advance_to(&self, target: Timestamp) {
        loop {
            let task = {
                let mut inner = lock(&self.inner);
                let Some((&(at, raw), _)) = inner.queue.first_key_value() else {
                    break;
                };
                if at > target.max(inner.now) {
                    break;
                }
                let task = inner.queue.remove(&(at, raw));
                inner.due.remove(&TimerId::new(raw));
                if at > inner.now {
                    inner.now = at;
                }
                task
            };
            // Run outside the lock so the task may schedule or cancel
            if let Some(task) = task {
                task();
            }
        }

        let mut inner = lock(&self.inner);
        if target > inner.now {
            inner.now = target;
        }
    }

    /// Run every task already due without moving the clock.
    pub fn trigger_actions(&self) {
        let now = self.now();
        self.advance_to(now);
    }

    /// Number of tasks scheduled and not yet run or cancelled.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner).queue.len()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Timestamp {
        lock(&self.inner).now
    }

    fn schedule_at(&self, at: Timestamp, task: Task) -> TimerId {
        let mut inner = lock(&self.inner);
        let raw = inner.next_id;
        inner.next_id += 1;
        let id = TimerId::new(raw);
        inner.queue.insert((at, raw), task);
        inner.due.insert(id, at);
        tracing::trace!(?id, %at, "Virtual task scheduled");
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut inner = lock(&self.inner);
        match inner.due.remove(&id) {
            Some(at) => inner.queue.remove(&(at, id.0)).is_some(),
            None => false,
        }
    }
}

impl std::fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("VirtualScheduler")
            .field("now", &inner.now)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<(&'static str, Timestamp)>>>, Arc<VirtualScheduler>) {
        (Arc::new(Mutex::new(Vec::new())), Arc::new(VirtualScheduler::new()))
    }

    fn record(
        log: &Arc<Mutex<Vec<(&'static str, Timestamp)>>>,
        scheduler: &Arc<VirtualScheduler>,
        label: &'static str,
    ) -> Task {
        let log = Arc::clone(log);
        let scheduler = Arc::clone(scheduler);
        Box::new(move || log.lock().unwrap().push((label, scheduler.now())))
    }

    fn secs(n: u64) -> Timestamp {
        Timestamp::from_offset(Duration::from_secs(n))
    }

    #[test]
    fn test_clock_starts_at_zero() {
        let scheduler = VirtualScheduler::new();
        assert_eq!(scheduler.now(), Timestamp::ZERO);
        scheduler.advance_by(Duration::from_millis(1500));
        assert_eq!(scheduler.now(), Timestamp::from_offset(Duration::from_millis(1500)));
    }

    #[test]
    fn test_runs_in_due_order() {
        let (log, scheduler) = recorder();
        scheduler.schedule_at(secs(2), record(&log, &scheduler, "b"));
        scheduler.schedule_at(secs(1), record(&log, &scheduler, "a"));
        scheduler.schedule_at(secs(2), record(&log, &scheduler, "c"));

        scheduler.advance_by(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec![("a", secs(1))]);

        scheduler.advance_by(Duration::from_secs(5));
        assert_eq!(
            *log.lock().unwrap(),
            vec![("a", secs(1)), ("b", secs(2)), ("c", secs(2))]
        );
        assert_eq!(scheduler.now(), secs(6));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_cancel_prevents_run() {
        let (log, scheduler) = recorder();
        let id = scheduler.schedule_at(secs(1), record(&log, &scheduler, "a"));

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        scheduler.advance_by(Duration::from_secs(2));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_task_can_schedule_within_advance() {
        let (log, scheduler) = recorder();
        let inner_task = record(&log, &scheduler, "inner");
        let nested = Arc::clone(&scheduler);
        scheduler.schedule_at(
            secs(1),
            Box::new(move || {
                let at = nested.now() + Duration::from_secs(1);
                nested.schedule_at(at, inner_task);
            }),
        );

        scheduler.advance_by(Duration::from_secs(3));
        assert_eq!(*log.lock().unwrap(), vec![("inner", secs(2))]);
    }

    #[test]
    fn test_past_due_runs_on_trigger() {
        let (log, scheduler) = recorder();
        scheduler.advance_by(Duration::from_secs(3));
        scheduler.schedule_at(secs(1), record(&log, &scheduler, "late"));
        assert!(log.lock().unwrap().is_empty());

        scheduler.trigger_actions();
        assert_eq!(*log.lock().unwrap(), vec![("late", secs(3))]);
    }
}
