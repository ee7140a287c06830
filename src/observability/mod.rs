//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing setup
//! - OpenTelemetry metrics for the pacing operator

pub mod metrics;
pub mod tracing;
