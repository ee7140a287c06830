//! `futures::Stream` adapter for the normalizer.
//!
//! `source.normalize(interval)` pumps a fallible stream through a
//! [`Normalizer`] on a spawned task and hands back the paced stream:
//! - `Ok(v)` items are values
//! - the first `Err(e)` ends the sequence with a failure (the source is not
//!   polled again)
//! - the end of the source is completion
//!
//! Dropping the returned [`Normalized`] cancels the operator and stops the
//! pump.

use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::Result;
use crate::interval::PacingInterval;
use crate::normalizer::{Normalizer, Subscription, Upstream};
use crate::notification::Notification;
use crate::scheduler::{Scheduler, TokioScheduler};

/// Adds pacing to any stream of results.
pub trait NormalizeExt<T, E>: Stream<Item = Result<T, E>> + Sized + Send + 'static
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Pace on tokio timers of the current runtime.
    fn normalize(self, interval: Duration) -> Result<Normalized<T, E>> {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::try_current()?);
        self.normalize_on(interval, scheduler)
    }

    /// Pace on an explicit scheduler.
    fn normalize_on(
        self,
        interval: Duration,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Normalized<T, E>> {
        let normalizer = Normalizer::new(PacingInterval::new(interval)?, scheduler);
        self.normalize_with(&normalizer)
    }

    /// Pace through a preconfigured normalizer.
    ///
    /// The pump runs on the current tokio runtime.
    fn normalize_with(self, normalizer: &Normalizer) -> Result<Normalized<T, E>> {
        let handle = Handle::try_current()?;
        Ok(Normalized::spawn(self, normalizer, &handle))
    }
}

impl<S, T, E> NormalizeExt<T, E> for S
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
}

/// A paced stream produced by [`NormalizeExt`].
pub struct Normalized<T, E> {
    rx: UnboundedReceiverStream<Notification<T, E>>,
    subscription: Subscription,
    _pump: DropGuard,
}

impl<T, E> Normalized<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn spawn<S>(source: S, normalizer: &Normalizer, handle: &Handle) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (upstream, subscription) = normalizer.attach(tx);
        let token = CancellationToken::new();

        handle.spawn(pump(source, upstream, token.clone()));

        Self {
            rx: UnboundedReceiverStream::new(rx),
            subscription,
            _pump: token.drop_guard(),
        }
    }

    /// The operator's subscription handle.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

async fn pump<S, T, E>(source: S, mut upstream: Upstream<T, E>, token: CancellationToken)
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let mut source = pin!(source);
    loop {
        let item = tokio::select! {
            biased;
            () = token.cancelled() => return,
            item = source.next() => item,
        };
        match item {
            Some(Ok(value)) => upstream.push(value),
            Some(Err(error)) => {
                tracing::debug!("Source failed, stopping pump");
                upstream.fail(error);
                return;
            }
            None => {
                upstream.complete();
                return;
            }
        }
    }
}

impl<T, E> Stream for Normalized<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.rx.poll_next_unpin(cx) {
            Poll::Ready(Some(Notification::Value(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Notification::Failed(error))) => Poll::Ready(Some(Err(error))),
            Poll::Ready(Some(Notification::Completed) | None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for Normalized<T, E> {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}
