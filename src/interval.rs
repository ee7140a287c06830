//! Validated pacing interval.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Minimum spacing between two consecutive downstream values.
///
/// Always strictly positive; fixed for the lifetime of a normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacingInterval(Duration);

impl PacingInterval {
    /// Validate a duration as a pacing interval.
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(Error::ZeroInterval);
        }
        Ok(Self(duration))
    }

    /// Shorthand for [`PacingInterval::new`] with a millisecond count.
    pub fn from_millis(millis: u64) -> Result<Self> {
        Self::new(Duration::from_millis(millis))
    }

    /// The underlying duration.
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl TryFrom<Duration> for PacingInterval {
    type Error = Error;

    fn try_from(duration: Duration) -> Result<Self> {
        Self::new(duration)
    }
}

impl From<PacingInterval> for Duration {
    fn from(interval: PacingInterval) -> Self {
        interval.0
    }
}

impl fmt::Display for PacingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
