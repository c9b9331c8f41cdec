//! Shared helpers for service unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::process::{ExitStatus, Output};

// ── Cross-platform ExitStatus helper ─────────────────────────────────────────

#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    ExitStatus::from_raw(code as u32)
}

pub fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

pub fn fail_output(stderr: &[u8]) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.to_vec(),
    }
}

// ── Progress reporter stub ───────────────────────────────────────────────────

use std::sync::Mutex;

use crate::application::ports::ProgressReporter;

/// Records every emitted message for assertions.
#[derive(Default)]
pub struct RecordingReporter {
    pub steps: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
    pub successes: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(u64, Option<u64>)>>,
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.steps.lock().expect("lock").push(message.to_string());
    }
    fn success(&self, message: &str) {
        self.successes
            .lock()
            .expect("lock")
            .push(message.to_string());
    }
    fn warn(&self, message: &str) {
        self.warnings
            .lock()
            .expect("lock")
            .push(message.to_string());
    }
    fn progress(&self, bytes: u64, total: Option<u64>) {
        self.progress.lock().expect("lock").push((bytes, total));
    }
}
