//! Progress reporting through the agent's structured log.
//!
//! The daemon has no terminal to draw on; step/success/warn events and
//! throttled byte-level progress all land in `tracing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::ProgressReporter;

/// Log a progress line every this many percent (when the total is known) or
/// this many bytes (when it is not).
const PERCENT_STEP: u64 = 10;
const BYTES_STEP: u64 = 16 * 1024 * 1024;

/// `ProgressReporter` that writes to the structured log.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    last_marker: Arc<AtomicU64>,
}

impl ProgressReporter for TracingReporter {
    fn step(&self, message: &str) {
        self.last_marker.store(0, Ordering::Relaxed);
        tracing::info!("{message}");
    }

    fn success(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn progress(&self, bytes: u64, total: Option<u64>) {
        let marker = match total {
            Some(total) if total > 0 => bytes * 100 / total / PERCENT_STEP,
            _ => bytes / BYTES_STEP,
        };
        if marker > self.last_marker.swap(marker, Ordering::Relaxed) {
            match total {
                Some(total) if total > 0 => tracing::info!(
                    "transferred {bytes}/{total} bytes ({}%)",
                    bytes * 100 / total
                ),
                _ => tracing::info!("transferred {bytes} bytes"),
            }
        }
    }
}
