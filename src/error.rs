//! Error types for cadence.
//!
//! The pacing state machine itself never fails; these errors cover
//! construction of its inputs.

use thiserror::Error;

/// Error type for building a normalizer or its collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("pacing interval must be greater than zero")]
    ZeroInterval,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<tokio::runtime::TryCurrentError> for Error {
    fn from(err: tokio::runtime::TryCurrentError) -> Self {
        Self::NoRuntime(err.to_string())
    }
}

/// Convenience result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
