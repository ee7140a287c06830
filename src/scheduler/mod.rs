//! Scheduler capability used to arrange delayed drains.
//!
//! Provides:
//! - The [`Scheduler`] trait (clock, delayed tasks, cancellation)
//! - [`VirtualScheduler`]: manually advanced clock for deterministic tests
//! - [`TokioScheduler`]: tokio timers on a runtime

pub mod realtime;
pub mod virtual_time;

pub use realtime::TokioScheduler;
pub use virtual_time::VirtualScheduler;

use std::fmt;
use std::ops::Add;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A point on a scheduler's timeline, as an offset from its origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The scheduler origin.
    pub const ZERO: Self = Self(Duration::ZERO);

    /// Timestamp at `offset` past the origin.
    pub const fn from_offset(offset: Duration) -> Self {
        Self(offset)
    }

    /// Offset from the origin.
    pub const fn offset(self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{:?}", self.0)
    }
}

/// Handle identifying one scheduled task, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A one-shot delayed callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Clock plus delayed execution.
///
/// Implementations must run each scheduled task at most once, never run a
/// task whose [`TimerId`] was cancelled before it started, and never hold
/// an internal lock while a task runs (tasks may schedule further tasks).
pub trait Scheduler: Send + Sync + 'static {
    /// Current time on this scheduler's timeline.
    fn now(&self) -> Timestamp;

    /// Run `task` once at `at`. Instants already in the past run as soon
    /// as the scheduler gets to them, never inline.
    fn schedule_at(&self, at: Timestamp, task: Task) -> TimerId;

    /// Cancel a task that has not started yet.
    ///
    /// Returns true if the task was still pending.
    fn cancel(&self, id: TimerId) -> bool;
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
