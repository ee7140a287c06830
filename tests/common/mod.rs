//! Test utilities for cadence integration tests.
//!
//! Provides:
//! - A recording observer that timestamps every notification
//! - A virtual-time harness around one operator instance

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence::{
    Normalizer, Notification, Observer, PacingInterval, Scheduler, Subscription, Timestamp,
    Upstream, VirtualScheduler,
};

/// Error type pushed through the operator in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boom(pub &'static str);

type Events<T, E> = Arc<Mutex<VecDeque<(Timestamp, Notification<T, E>)>>>;

/// Records notifications with the virtual time they were observed at.
pub struct RecordingObserver<T, E> {
    events: Events<T, E>,
    clock: Arc<VirtualScheduler>,
}

impl<T, E> RecordingObserver<T, E>
where
    T: Debug + Send + 'static,
    E: Debug + Send + 'static,
{
    pub fn new(clock: Arc<VirtualScheduler>) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            clock,
        }
    }

    /// An observer feeding this recorder.
    pub fn observer(&self) -> impl Observer<T, E> {
        let events = Arc::clone(&self.events);
        let clock = Arc::clone(&self.clock);
        move |n: Notification<T, E>| events.lock().unwrap().push_back((clock.now(), n))
    }

    fn take(&self) -> (Timestamp, Notification<T, E>) {
        self.events
            .lock()
            .unwrap()
            .pop_front()
            .expect("expected an event, none recorded")
    }

    /// Pop the next event, which must be a value.
    pub fn take_next(&self) -> T {
        self.take_next_at().1
    }

    /// Pop the next event, which must be a value, with its observation time.
    pub fn take_next_at(&self) -> (Timestamp, T) {
        match self.take() {
            (at, Notification::Value(value)) => (at, value),
            (_, other) => panic!("expected a value, got {other:?}"),
        }
    }

    /// Pop the next event, which must be a failure.
    pub fn take_error(&self) -> E {
        match self.take() {
            (_, Notification::Failed(error)) => error,
            (_, other) => panic!("expected a failure, got {other:?}"),
        }
    }

    /// Pop the next event, which must be completion.
    pub fn assert_on_completed(&self) {
        match self.take() {
            (_, Notification::Completed) => {}
            (_, other) => panic!("expected completion, got {other:?}"),
        }
    }

    pub fn assert_no_more_events(&self) {
        let events = self.events.lock().unwrap();
        assert!(events.is_empty(), "unexpected events: {:?}", *events);
    }

    /// Drain every recorded event.
    pub fn drain(&self) -> Vec<(Timestamp, Notification<T, E>)> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

/// One operator instance on a virtual clock.
pub struct Harness {
    pub scheduler: Arc<VirtualScheduler>,
    pub upstream: Upstream<u32, Boom>,
    pub subscription: Subscription,
    pub recorder: RecordingObserver<u32, Boom>,
}

impl Harness {
    /// Attach an operator pacing at `interval`.
    pub fn new(interval: Duration) -> Self {
        let scheduler = Arc::new(VirtualScheduler::new());
        let recorder = RecordingObserver::new(Arc::clone(&scheduler));
        let normalizer = Normalizer::new(
            PacingInterval::new(interval).expect("interval must be positive"),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        )
        .with_name("test");
        let (upstream, subscription) = normalizer.attach(recorder.observer());
        Self {
            scheduler,
            upstream,
            subscription,
            recorder,
        }
    }

    /// Attach an operator pacing at one second.
    pub fn one_second() -> Self {
        Self::new(secs(1))
    }

    pub fn advance(&self, by: Duration) {
        self.scheduler.advance_by(by);
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn at(offset: Duration) -> Timestamp {
    Timestamp::from_offset(offset)
}
