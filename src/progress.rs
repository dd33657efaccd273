//! Ingestion progress reporting.
//!
//! Progress is a side channel: the pipeline reports `(fraction, description)`
//! at stage boundaries, and a failing sink never stops ingestion. Output goes
//! to **stderr** so stdout remains parseable for scripts.
//!
//! Stage fractions of one run:
//!
//! | Stage | Fraction |
//! |-------|----------|
//! | Dispatch (CLI resolves paths) | 0.00 – 0.35 |
//! | Chunking, per file | 0.40 – 0.70 |
//! | Embedding + storage, per chunk | 0.70 – 0.95 |
//! | Final flush | 0.95 – 0.99 |
//! | Completion | 1.00 |

use std::io::Write;

use anyhow::Result;

pub const DISPATCH_END: f32 = 0.35;
pub const CHUNKING_START: f32 = 0.40;
pub const CHUNKING_END: f32 = 0.70;
pub const EMBEDDING_START: f32 = 0.70;
pub const EMBEDDING_END: f32 = 0.95;
pub const FLUSH_START: f32 = 0.95;
pub const FLUSH_END: f32 = 0.99;

/// Receives progress updates. May fail; callers log and continue.
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f32, description: &str) -> Result<()>;
}

/// Human-friendly progress on stderr: `[ 55%] Chunking notes.txt`.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, fraction: f32, description: &str) -> Result<()> {
        let mut err = std::io::stderr().lock();
        writeln!(err, "[{:>3.0}%] {}", fraction * 100.0, description)?;
        err.flush()?;
        Ok(())
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressSink for JsonProgress {
    fn report(&self, fraction: f32, description: &str) -> Result<()> {
        let obj = serde_json::json!({
            "event": "progress",
            "fraction": fraction,
            "description": description,
        });
        let line = serde_json::to_string(&obj)?;
        let mut err = std::io::stderr().lock();
        writeln!(err, "{}", line)?;
        err.flush()?;
        Ok(())
    }
}

/// No-op sink when progress is disabled.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32, _description: &str) -> Result<()> {
        Ok(())
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn sink(&self) -> Box<dyn ProgressSink> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

/// Wraps an optional sink for one run.
///
/// Fractions are clamped into `[0, 1]` and never go backwards: a value
/// lower than the last one reported is raised to it. Sink errors are
/// logged at warn level and otherwise ignored.
pub struct ProgressTracker<'a> {
    sink: Option<&'a dyn ProgressSink>,
    last: f32,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Self { sink, last: 0.0 }
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    pub fn report(&mut self, fraction: f32, description: &str) {
        let fraction = if fraction.is_nan() {
            self.last
        } else {
            fraction.clamp(0.0, 1.0).max(self.last)
        };
        self.last = fraction;

        let Some(sink) = self.sink else {
            return;
        };
        if let Err(e) = sink.report(fraction, description) {
            tracing::warn!(error = %e, fraction, "progress sink failed; continuing");
        }
    }

    /// Report step `done` of `total` within `[start, end]`.
    pub fn report_step(&mut self, start: f32, end: f32, done: usize, total: usize, description: &str) {
        self.report(interpolate(start, end, done, total), description);
    }
}

/// `start + (end - start) * done / total`; `end` when `total` is zero.
pub fn interpolate(start: f32, end: f32, done: usize, total: usize) -> f32 {
    if total == 0 {
        return end;
    }
    start + (end - start) * (done.min(total) as f32 / total as f32)
}
