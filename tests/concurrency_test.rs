//! Cross-thread delivery on a multi-threaded runtime.
//!
//! Upstream pushes run on blocking-pool threads while drain timers fire on
//! runtime workers, so both sides race to deliver.
//!
//! Tests:
//! - Every value arrives exactly once, in order, with completion last
//! - Cancelling from another thread leaves an ordered prefix and no terminal

use std::sync::Arc;
use std::time::Duration;

use cadence::observability::tracing::init_test_tracing;
use cadence::{Normalizer, Notification, PacingInterval, Scheduler, TokioScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

const ROUNDS: u32 = 20;
const VALUES: u32 = 200;

fn paced_every(millis: u64) -> Normalizer {
    let scheduler: Arc<dyn Scheduler> =
        Arc::new(TokioScheduler::try_current().expect("inside a runtime"));
    Normalizer::new(PacingInterval::from_millis(millis).unwrap(), scheduler)
        .with_name("concurrency")
}

/// Receive until a terminal notification or the channel closes.
async fn collect(
    mut rx: mpsc::UnboundedReceiver<Notification<u32, ()>>,
) -> Vec<Notification<u32, ()>> {
    let mut seen = Vec::new();
    while let Some(n) = rx.recv().await {
        let terminal = n.is_terminal();
        seen.push(n);
        if terminal {
            break;
        }
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_once_in_order_across_threads() {
    init_test_tracing();
    let normalizer = paced_every(1);

    let mut rounds = JoinSet::new();
    for round in 0..ROUNDS {
        let (tx, rx) = mpsc::unbounded_channel::<Notification<u32, ()>>();
        let (mut upstream, _subscription) = normalizer.attach(tx);

        rounds.spawn(async move {
            let pushes = tokio::task::spawn_blocking(move || {
                for v in 0..VALUES {
                    upstream.push(v);
                    if v % 16 == 0 {
                        std::thread::yield_now();
                    }
                }
                upstream.complete();
            });

            let seen = timeout(Duration::from_secs(30), collect(rx))
                .await
                .expect("round did not finish");
            pushes.await.expect("push thread panicked");
            (round, seen)
        });
    }

    while let Some(joined) = rounds.join_next().await {
        let (round, seen) = joined.expect("round panicked");
        let (last, values) = seen.split_last().expect("notifications received");
        assert_eq!(*last, Notification::Completed, "round {round}: terminal last");

        let values: Vec<u32> = values
            .iter()
            .map(|n| match n {
                Notification::Value(v) => *v,
                other => panic!("round {round}: unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, (0..VALUES).collect::<Vec<_>>(), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_from_another_thread_leaves_ordered_prefix() {
    let normalizer = paced_every(5);
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification<u32, ()>>();
    let (mut upstream, subscription) = normalizer.attach(tx);

    let pushes = tokio::task::spawn_blocking(move || {
        for v in 0..VALUES {
            upstream.push(v);
        }
        upstream.complete();
    });
    pushes.await.expect("push thread panicked");

    // Let a few values drain, then stop it from a blocking thread
    tokio::time::sleep(Duration::from_millis(20)).await;
    let canceller = subscription.clone();
    tokio::task::spawn_blocking(move || canceller.cancel())
        .await
        .expect("cancel thread panicked");
    assert!(subscription.is_cancelled());

    // Cancel drops the observer, which closes the channel
    let mut values = Vec::new();
    while let Some(n) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("channel not closed after cancel")
    {
        match n {
            Notification::Value(v) => values.push(v),
            other => panic!("unexpected {other:?} after cancel"),
        }
    }

    assert!(!values.is_empty());
    assert!(values.len() < VALUES as usize);
    assert_eq!(values, (0..values.len() as u32).collect::<Vec<_>>());
}
