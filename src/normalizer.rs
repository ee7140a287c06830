//! The pacing state machine.
//!
//! A [`Normalizer`] is a factory: every [`Normalizer::attach`] creates an
//! independent operator instance and returns its two handles:
//! - [`Upstream`]: where the source pushes values and its terminal signal
//! - [`Subscription`]: where the consumer cancels
//!
//! Values are forwarded immediately when the operator has been quiet for at
//! least one interval, otherwise they are queued and drained one per
//! interval by a single scheduled timer. A terminal signal is held back
//! until the queue is empty.
//!
//! All transitions of one instance run under one mutex. Downstream delivery
//! goes through an outbox drained by whichever caller finds it idle, so the
//! observer is never called with the lock held and never concurrently.
//! An observer that panics cancels its instance before the panic unwinds.

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::interval::PacingInterval;
use crate::notification::{Notification, Observer, Terminal};
use crate::observability::metrics::{record_buffered, record_emitted, record_received};
use crate::scheduler::{lock, Scheduler, TimerId, Timestamp};

/// Source of process-unique instance ids for metric attributes.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Factory for paced operator instances.
#[derive(Clone)]
pub struct Normalizer {
    interval: PacingInterval,
    scheduler: Arc<dyn Scheduler>,
    name: Arc<str>,
}

impl Normalizer {
    /// Create a factory pacing at `interval` on `scheduler`.
    pub fn new(interval: PacingInterval, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            interval,
            scheduler,
            name: Arc::from("normalize"),
        }
    }

    /// Name used in log fields and metric attributes.
    ///
    /// Instances attached from one factory share the name; each also gets
    /// its own instance id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    /// The configured interval.
    pub fn interval(&self) -> PacingInterval {
        self.interval
    }

    /// Create an operator instance delivering to `downstream`.
    pub fn attach<T, E, O>(&self, downstream: O) -> (Upstream<T, E>, Subscription)
    where
        T: Send + 'static,
        E: Send + 'static,
        O: Observer<T, E>,
    {
        let shared = Arc::new(Shared {
            interval: self.interval.as_duration(),
            scheduler: Arc::clone(&self.scheduler),
            name: Arc::clone(&self.name),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(State::new(Box::new(downstream))),
        });
        tracing::debug!(
            normalizer = %self.name,
            instance = shared.instance,
            interval = %self.interval,
            "Operator attached"
        );

        let subscription = Subscription {
            inner: Arc::clone(&shared) as Arc<dyn Cancel>,
        };
        (Upstream { shared }, subscription)
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("interval", &self.interval)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Producer side of one operator instance.
///
/// Not `Clone`: a single owner pushes, so upstream calls are serialized.
/// The terminal methods consume the handle, which makes a second terminal
/// signal or a value after one impossible to express.
pub struct Upstream<T, E> {
    shared: Arc<Shared<T, E>>,
}

impl<T, E> Upstream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Push the next value. Never blocks and never rejects.
    pub fn push(&mut self, value: T) {
        self.shared.on_value(value);
    }

    /// Signal normal completion.
    pub fn complete(self) {
        self.shared.on_terminal(Terminal::Completed);
    }

    /// Signal failure.
    pub fn fail(self, error: E) {
        self.shared.on_terminal(Terminal::Failed(error));
    }

    /// Forward a notification, consuming the handle on a terminal one.
    ///
    /// Returns the handle back while the sequence is still open.
    pub fn send(mut self, notification: Notification<T, E>) -> Option<Self> {
        match notification {
            Notification::Value(value) => {
                self.push(value);
                Some(self)
            }
            Notification::Completed => {
                self.complete();
                None
            }
            Notification::Failed(error) => {
                self.fail(error);
                None
            }
        }
    }

    /// Number of values waiting to be drained.
    pub fn buffered(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }

    /// Whether the consumer has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Another handle to this instance's subscription.
    pub fn subscription(&self) -> Subscription {
        Subscription {
            inner: Arc::clone(&self.shared) as Arc<dyn Cancel>,
        }
    }
}

impl<T, E> fmt::Debug for Upstream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upstream")
            .field("name", &self.shared.name)
            .field("instance", &self.shared.instance)
            .finish_non_exhaustive()
    }
}

/// Consumer side of one operator instance.
///
/// Dropping a subscription does not cancel; buffered values keep draining.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<dyn Cancel>,
}

impl Subscription {
    /// Stop the operator: the pending drain is cancelled, buffered values
    /// are discarded, and nothing else reaches the observer, including a
    /// deferred terminal signal. Calling it again is a no-op.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether [`Subscription::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

trait Cancel: Send + Sync {
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

enum Phase<E> {
    Active,
    /// Upstream ended while values were still queued.
    Terminating(Terminal<E>),
    Finished,
    Cancelled,
}

impl<E> Phase<E> {
    fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Take a deferred terminal signal, moving to `Finished`.
    fn finish(&mut self) -> Option<Terminal<E>> {
        match mem::replace(self, Self::Finished) {
            Self::Terminating(terminal) => Some(terminal),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[derive(Clone, Copy)]
struct ArmedTimer {
    generation: u64,
    id: TimerId,
}

struct Queued<T> {
    value: T,
    since: Timestamp,
}

struct State<T, E> {
    queue: VecDeque<Queued<T>>,
    last_emission: Option<Timestamp>,
    timer: Option<ArmedTimer>,
    generation: u64,
    phase: Phase<E>,
    downstream: Option<Box<dyn Observer<T, E>>>,
    outbox: VecDeque<Notification<T, E>>,
    delivering: bool,
}

impl<T, E> State<T, E> {
    fn new(downstream: Box<dyn Observer<T, E>>) -> Self {
        Self {
            queue: VecDeque::new(),
            last_emission: None,
            timer: None,
            generation: 0,
            phase: Phase::Active,
            downstream: Some(downstream),
            outbox: VecDeque::new(),
            delivering: false,
        }
    }
}

struct Shared<T, E> {
    interval: Duration,
    scheduler: Arc<dyn Scheduler>,
    name: Arc<str>,
    instance: u64,
    state: Mutex<State<T, E>>,
}

impl<T, E> Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn on_value(self: &Arc<Self>, value: T) {
        let mut state = lock(&self.state);
        if !state.phase.is_active() {
            tracing::debug!(normalizer = %self.name, "Ignoring value after termination");
            return;
        }
        record_received(&self.name);

        let now = self.scheduler.now();
        let quiet = state
            .last_emission
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);

        if state.queue.is_empty() && quiet {
            debug_assert!(state.timer.is_none());
            state.last_emission = Some(now);
            state.outbox.push_back(Notification::Value(value));
            record_emitted(&self.name, Duration::ZERO);
            tracing::trace!(normalizer = %self.name, %now, "Value emitted immediately");
        } else {
            state.queue.push_back(Queued { value, since: now });
            if state.timer.is_none() {
                let due = state
                    .last_emission
                    .map_or(now, |last| last + self.interval)
                    .max(now);
                self.arm(&mut state, due);
            }
            record_buffered(&self.name, self.instance, state.queue.len());
            tracing::debug!(
                normalizer = %self.name,
                queued = state.queue.len(),
                "Value buffered"
            );
        }

        self.deliver(state);
    }

    fn on_terminal(self: &Arc<Self>, terminal: Terminal<E>) {
        let mut state = lock(&self.state);
        if !state.phase.is_active() {
            tracing::debug!(normalizer = %self.name, "Ignoring terminal signal after termination");
            return;
        }

        if state.queue.is_empty() && state.timer.is_none() {
            state.phase = Phase::Finished;
            state.outbox.push_back(terminal.into_notification());
            tracing::debug!(normalizer = %self.name, "Terminal signal forwarded");
        } else {
            state.phase = Phase::Terminating(terminal);
            tracing::debug!(
                normalizer = %self.name,
                queued = state.queue.len(),
                "Terminal signal deferred until drained"
            );
        }

        self.deliver(state);
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut state = lock(&self.state);
        if state.timer.map(|armed| armed.generation) != Some(generation) {
            // Cancelled or superseded
            return;
        }
        state.timer = None;

        let now = self.scheduler.now();
        if let Some(queued) = state.queue.pop_front() {
            state.last_emission = Some(now);
            state.outbox.push_back(Notification::Value(queued.value));
            record_emitted(&self.name, now.saturating_duration_since(queued.since));
            tracing::trace!(normalizer = %self.name, %now, "Value drained");
        }

        if !state.queue.is_empty() {
            self.arm(&mut state, now + self.interval);
        } else if let Some(terminal) = state.phase.finish() {
            state.outbox.push_back(terminal.into_notification());
            tracing::debug!(normalizer = %self.name, "Drained, terminal signal forwarded");
        }
        record_buffered(&self.name, self.instance, state.queue.len());

        self.deliver(state);
    }

    /// Schedule the single drain timer. The generation tag lets a firing
    /// recognize that it was cancelled or replaced.
    fn arm(self: &Arc<Self>, state: &mut State<T, E>, due: Timestamp) {
        debug_assert!(state.timer.is_none());
        state.generation += 1;
        let generation = state.generation;
        let shared = Arc::clone(self);
        let id = self
            .scheduler
            .schedule_at(due, Box::new(move || shared.on_timer(generation)));
        state.timer = Some(ArmedTimer { generation, id });
        tracing::trace!(normalizer = %self.name, %due, "Drain timer armed");
    }

    fn deliver<'a>(&'a self, mut state: MutexGuard<'a, State<T, E>>) {
        if state.delivering {
            // The active deliverer picks up what was just queued
            return;
        }
        state.delivering = true;

        let mut retired = None;
        loop {
            let Some(notification) = state.outbox.pop_front() else {
                break;
            };
            let Some(mut downstream) = state.downstream.take() else {
                state.outbox.clear();
                break;
            };
            drop(state);

            let terminal = notification.is_terminal();
            let guard = ObserverPanic { shared: self };
            downstream.on_notification(notification);
            mem::forget(guard);

            state = lock(&self.state);
            if terminal || matches!(state.phase, Phase::Cancelled) {
                retired = Some(downstream);
            } else {
                state.downstream = Some(downstream);
            }
        }

        state.delivering = false;
        drop(state);
        drop(retired);
    }
}

/// Armed around an observer call; only dropped if the observer panicked.
struct ObserverPanic<'a, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    shared: &'a Shared<T, E>,
}

impl<T, E> Drop for ObserverPanic<'_, T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn drop(&mut self) {
        lock(&self.shared.state).delivering = false;
        tracing::warn!(
            normalizer = %self.shared.name,
            instance = self.shared.instance,
            "Observer panicked, cancelling"
        );
        self.shared.cancel();
    }
}

impl<T, E> Cancel for Shared<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn cancel(&self) {
        let mut state = lock(&self.state);
        if matches!(state.phase, Phase::Cancelled) {
            return;
        }
        state.phase = Phase::Cancelled;
        if let Some(armed) = state.timer.take() {
            self.scheduler.cancel(armed.id);
        }
        let discarded = state.queue.len();
        state.queue.clear();
        state.outbox.clear();
        let downstream = state.downstream.take();
        record_buffered(&self.name, self.instance, 0);
        drop(state);
        drop(downstream);

        tracing::debug!(
            normalizer = %self.name,
            instance = self.instance,
            discarded,
            "Subscription cancelled"
        );
    }

    fn is_cancelled(&self) -> bool {
        matches!(lock(&self.state).phase, Phase::Cancelled)
    }
}
