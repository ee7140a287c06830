//! Cadence: a rate-normalizing operator for push sequences.
//!
//! A normalizer sits between a producer and a consumer and guarantees the
//! consumer sees at most one value per interval, in order, with nothing
//! dropped. Bursts are buffered and drained one per interval; the terminal
//! signal is delivered only after the buffer is empty.
//!
//! # Architecture
//!
//! - **Push protocol**: a single [`Notification`] enum handled by an [`Observer`]
//! - **Injected time**: a [`Scheduler`] trait with virtual and tokio implementations
//! - **Per-instance state**: one mutex per operator, no globals
//! - **Observable**: tracing spans/events and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration for the binary
//! - [`error`]: Error types
//! - [`interval`]: Validated pacing interval
//! - [`normalizer`]: The pacing state machine
//! - [`notification`]: Push protocol types
//! - [`observability`]: Metrics and tracing setup
//! - [`scheduler`]: Clock and delayed-task capability
//! - [`stream`]: `futures::Stream` adapter
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//! use cadence::{Normalizer, Notification, PacingInterval, Scheduler, VirtualScheduler};
//!
//! let scheduler = Arc::new(VirtualScheduler::new());
//! let normalizer = Normalizer::new(
//!     PacingInterval::new(Duration::from_secs(1)).unwrap(),
//!     scheduler.clone() as Arc<dyn Scheduler>,
//! );
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let (mut upstream, _subscription) =
//!     normalizer.attach(move |n: Notification<u32, ()>| sink.lock().unwrap().push(n));
//!
//! upstream.push(1);
//! upstream.push(2);
//! assert_eq!(seen.lock().unwrap().len(), 1);
//!
//! scheduler.advance_by(Duration::from_secs(1));
//! assert_eq!(seen.lock().unwrap().len(), 2);
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // normalizer::Normalizer is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod error;
pub mod interval;
pub mod normalizer;
pub mod notification;
pub mod observability;
pub mod scheduler;
pub mod stream;

pub use error::{Error, Result};
pub use interval::PacingInterval;
pub use normalizer::{Normalizer, Subscription, Upstream};
pub use notification::{Notification, Observer};
pub use scheduler::{Scheduler, Task, TimerId, Timestamp, TokioScheduler, VirtualScheduler};
pub use stream::{NormalizeExt, Normalized};
