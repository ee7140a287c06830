//! Cadence: pace stdin lines onto stdout.
//!
//! # Usage
//!
//! ```bash
//! tail -f app.log | cadence --interval-ms 500
//! ```
//!
//! Environment variables can also be used:
//! - `CADENCE_INTERVAL_MS`: Minimum spacing between lines
//! - `CADENCE_OUTPUT`: `text` or `json`
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use std::io::{self, BufRead};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use cadence::config::{Config, OutputFormat};
use cadence::observability::metrics::init_metrics;
use cadence::observability::tracing::init_tracing;
use cadence::NormalizeExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Serialize)]
struct LineOutput<'a> {
    line: &'a str,
    elapsed_ms: u128,
}

/// Read stdin lines on a dedicated OS thread.
///
/// A blocked read on this thread never holds up runtime shutdown, so Ctrl+C
/// exits even while the writer keeps stdin open.
fn stdin_lines() -> Result<UnboundedReceiverStream<io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("failed to spawn stdin reader")?;
    Ok(UnboundedReceiverStream::new(rx))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    // Initialize metrics
    init_metrics();

    let interval = config.interval().context("invalid --interval-ms")?;
    tracing::info!(%interval, output = ?config.output, "Pacing stdin");

    let mut paced = stdin_lines()?
        .normalize(interval.as_duration())
        .context("failed to start normalizer")?;

    let start = Instant::now();
    let mut written: u64 = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!(written, "Received Ctrl+C, discarding buffered lines");
                break;
            }
            next = paced.next() => match next {
                Some(Ok(line)) => {
                    written += 1;
                    match config.output {
                        OutputFormat::Text => println!("{line}"),
                        OutputFormat::Json => {
                            let output = LineOutput {
                                line: &line,
                                elapsed_ms: start.elapsed().as_millis(),
                            };
                            println!("{}", serde_json::to_string(&output)?);
                        }
                    }
                }
                Some(Err(e)) => {
                    return Err(e).context("failed to read stdin");
                }
                None => {
                    tracing::info!(written, "Input drained");
                    break;
                }
            }
        }
    }

    Ok(())
}
