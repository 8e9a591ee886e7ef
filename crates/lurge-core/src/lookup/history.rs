use ahash::AHashMap;
use chrono::NaiveDate;

pub trait UsageHistory: Send + Sync {
    /// Past usage observations for a group's base directory, oldest first.
    fn history(&self, group_name: &str, base_path: &str) -> &[(NaiveDate, u64)];
}

/// Read-only snapshot of past group usage, built once per run.
#[derive(Debug, Clone, Default)]
pub struct HistoricalUsage {
    series: AHashMap<(String, String), Vec<(NaiveDate, u64)>>,
}

impl HistoricalUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, group_name: &str, base_path: &str, date: NaiveDate, used: u64) {
        let series = self
            .series
            .entry((group_name.to_string(), base_path.to_string()))
            .or_default();
        let pos = series.partition_point(|(d, _)| *d <= date);
        series.insert(pos, (date, used));
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl UsageHistory for HistoricalUsage {
    fn history(&self, group_name: &str, base_path: &str) -> &[(NaiveDate, u64)] {
        self.series
            .get(&(group_name.to_string(), base_path.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
