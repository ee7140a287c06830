//! Configuration parsing for the cadence binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::{Parser, ValueEnum};

use crate::error::Result;
use crate::interval::PacingInterval;

/// Cadence: pace stdin lines onto stdout, at most one per interval.
#[derive(Parser, Debug, Clone)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Minimum spacing between output lines, in milliseconds
    #[arg(short, long, env = "CADENCE_INTERVAL_MS", default_value_t = 1000)]
    pub interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Output format
    #[arg(short, long, env = "CADENCE_OUTPUT", value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// How paced lines are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The line as read
    #[default]
    Text,
    /// One JSON object per line with the elapsed time
    Json,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The validated pacing interval.
    pub fn interval(&self) -> Result<PacingInterval> {
        PacingInterval::from_millis(self.interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            log_level: "info".into(),
            output: OutputFormat::Text,
        }
    }
}
