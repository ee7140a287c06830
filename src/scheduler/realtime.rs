//! Real-time scheduler backed by tokio timers.
//!
//! Every scheduled task becomes a spawned tokio task that sleeps until its
//! due instant, racing a cancellation token. Timestamps are offsets from an
//! origin `tokio::time::Instant`, so paused tokio time drives it in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{lock, Scheduler, Task, TimerId, Timestamp};
use crate::error::Result;

/// Scheduler running tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    origin: Instant,
    next_id: Arc<AtomicU64>,
    /// Cancellation tokens for tasks that have not started yet.
    pending: Arc<Mutex<HashMap<TimerId, CancellationToken>>>,
}

impl TokioScheduler {
    /// Create a scheduler on the runtime the caller is running in.
    ///
    /// Fails outside a tokio runtime.
    pub fn try_current() -> Result<Self> {
        Ok(Self::with_handle(Handle::try_current()?))
    }

    /// Create a scheduler spawning onto `handle`.
    ///
    /// Must be called from a context where tokio's clock is available.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            origin: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of tasks scheduled and not yet started or cancelled.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Timestamp {
        Timestamp::from_offset(Instant::now().saturating_duration_since(self.origin))
    }

    fn schedule_at(&self, at: Timestamp, task: Task) -> TimerId {
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        lock(&self.pending).insert(id, token.clone());

        let deadline = self.origin + at.offset();
        let pending = Arc::clone(&self.pending);
        self.handle.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    // A cancel that won the lock first leaves no entry behind
                    if lock(&pending).remove(&id).is_some() {
                        task();
                    }
                }
            }
        });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        match lock(&self.pending).remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("origin", &self.origin)
            .field("pending", &self.pending_count())
            .finish()
    }
}
