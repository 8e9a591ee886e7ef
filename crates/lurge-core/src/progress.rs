use crate::aggregate::ReportKind;

/// Trait for reporting run progress.
///
/// The CLI implements it with tracing and indicatif. Volumes are processed
/// concurrently, so implementations must tolerate calls from several threads.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_volume_start(&self, _volume: u32, _census_path: &str) {}
    fn on_lines_read(&self, _volume: u32, _lines: u64) {}
    fn on_volume_complete(&self, _volume: u32, _rows: usize, _duration_secs: f64) {}
    fn on_volume_skipped(&self, _volume: u32, _reason: &str) {}
    fn on_volume_failed(&self, _volume: u32, _error: &str) {}
    fn on_persist_complete(&self, _volume: u32, _kind: ReportKind, _rows: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
