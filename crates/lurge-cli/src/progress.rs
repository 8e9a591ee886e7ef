use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lurge_core::aggregate::ReportKind;
use lurge_core::ProgressReporter;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// CLI progress reporter using indicatif.
///
/// Volumes run concurrently, so each gets its own spinner showing lines
/// read, replaced by a one-line result when the volume finishes.
pub struct CliReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<u32, ProgressBar>>,
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn with_bar(&self, volume: u32, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(pb) = bars.get(&volume) {
                f(pb);
            }
        }
    }

    fn finish_bar(&self, volume: u32) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(pb) = bars.remove(&volume) {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_volume_start(&self, volume: u32, census_path: &str) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(spinner_style());
        pb.set_prefix(format!("scratch{}", volume));
        pb.set_message(format!("Reading {}", census_path));
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(old) = bars.insert(volume, pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_lines_read(&self, volume: u32, lines: u64) {
        self.with_bar(volume, |pb| pb.set_message(format!("{} lines read", lines)));
    }

    fn on_volume_complete(&self, volume: u32, rows: usize, duration_secs: f64) {
        self.finish_bar(volume);
        let _ = self.multi.println(format!(
            "  \x1b[32m✓\x1b[0m scratch{}: {} report rows in {:.2}s",
            volume, rows, duration_secs
        ));
    }

    fn on_volume_skipped(&self, volume: u32, reason: &str) {
        self.finish_bar(volume);
        let _ = self
            .multi
            .println(format!("  \x1b[33m-\x1b[0m scratch{}: skipped, {}", volume, reason));
    }

    fn on_volume_failed(&self, volume: u32, error: &str) {
        self.finish_bar(volume);
        let _ = self
            .multi
            .println(format!("  \x1b[31m✗\x1b[0m scratch{}: {}", volume, error));
    }

    fn on_persist_complete(&self, volume: u32, kind: ReportKind, rows: usize, duration_secs: f64) {
        let _ = self.multi.println(format!(
            "  \x1b[32m✓\x1b[0m scratch{}: {} {} rows written in {:.2}s",
            volume, rows, kind, duration_secs
        ));
    }
}
