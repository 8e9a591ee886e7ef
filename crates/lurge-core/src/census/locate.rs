use crate::error::Error;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// A census file selected for one volume pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusFile {
    pub volume: u32,
    pub path: PathBuf,
    /// Modification time of the census file, used as the snapshot time.
    pub timestamp: i64,
}

impl CensusFile {
    /// Calendar date the census describes. [`CensusDirectory`] never picks a
    /// file whose timestamp has no date, so the epoch fallback only shows up
    /// for hand-built values.
    pub fn record_date(&self) -> NaiveDate {
        match DateTime::<Utc>::from_timestamp(self.timestamp, 0) {
            Some(dt) => dt.date_naive(),
            None => {
                warn!(
                    "scratch{}: census timestamp {} is out of range, dating it {}",
                    self.volume,
                    self.timestamp,
                    NaiveDate::default()
                );
                NaiveDate::default()
            }
        }
    }
}

pub trait CensusLocator: Send + Sync {
    fn find_latest(&self, volume: u32, start_days_ago: u32) -> Result<CensusFile, Error>;
}

/// Looks for `{YYYYMMDD}_scratch{volume}.*.*.stats.gz` in a directory,
/// walking back one day at a time.
pub struct CensusDirectory {
    dir: PathBuf,
    max_days_ago: u32,
    today: Option<NaiveDate>,
}

impl CensusDirectory {
    pub fn new(dir: impl Into<PathBuf>, max_days_ago: u32) -> Self {
        Self {
            dir: dir.into(),
            max_days_ago,
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn pattern_for(&self, date: NaiveDate, volume: u32) -> String {
        self.dir
            .join(format!(
                "{}_scratch{}.*.*.stats.gz",
                date.format("%Y%m%d"),
                volume
            ))
            .to_string_lossy()
            .into_owned()
    }
}

impl CensusLocator for CensusDirectory {
    fn find_latest(&self, volume: u32, start_days_ago: u32) -> Result<CensusFile, Error> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());

        for days_ago in start_days_ago..self.max_days_ago {
            let date = today - Duration::days(days_ago as i64);
            let pattern = self.pattern_for(date, volume);
            let mut candidates: Vec<(PathBuf, i64)> = match glob::glob(&pattern) {
                Ok(paths) => paths
                    .filter_map(|entry| entry.ok())
                    .filter_map(|path| modified_secs(&path).map(|t| (path, t)))
                    .filter(|(path, t)| {
                        let dated = DateTime::<Utc>::from_timestamp(*t, 0).is_some();
                        if !dated {
                            warn!("Ignoring {}: modification time {} is out of range", path.display(), t);
                        }
                        dated
                    })
                    .collect(),
                Err(e) => {
                    warn!("Invalid census glob '{}': {}", pattern, e);
                    Vec::new()
                }
            };

            if candidates.is_empty() {
                debug!("No census file for volume {} on {}", volume, date);
                continue;
            }

            // Several scans on the same day: the most recently written one wins.
            candidates.sort_by(|a, b| b.1.cmp(&a.1));
            let (path, timestamp) = candidates.swap_remove(0);
            info!(
                "scratch{}: using census output for {} ({})",
                volume,
                date.format("%Y%m%d"),
                path.display()
            );
            return Ok(CensusFile {
                volume,
                path,
                timestamp,
            });
        }

        Err(Error::CensusNotFound {
            volume,
            max_days_ago: self.max_days_ago,
        })
    }
}

fn modified_secs(path: &Path) -> Option<i64> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_finds_file_a_few_days_back() {
        let dir = tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        fs::write(dir.path().join("20240308_scratch119.abc.def.stats.gz"), b"").unwrap();
        fs::write(dir.path().join("20240308_scratch115.abc.def.stats.gz"), b"").unwrap();

        let locator = CensusDirectory::new(dir.path(), 10).with_today(today);
        let found = locator.find_latest(119, 0).unwrap();
        assert!(found.path.ends_with("20240308_scratch119.abc.def.stats.gz"));
        assert_eq!(found.volume, 119);
    }

    #[test]
    fn test_start_days_ago_skips_newer_files() {
        let dir = tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        fs::write(dir.path().join("20240310_scratch1.a.b.stats.gz"), b"").unwrap();
        fs::write(dir.path().join("20240307_scratch1.a.b.stats.gz"), b"").unwrap();

        let locator = CensusDirectory::new(dir.path(), 10).with_today(today);
        let found = locator.find_latest(1, 1).unwrap();
        assert!(found.path.ends_with("20240307_scratch1.a.b.stats.gz"));
    }

    #[test]
    fn test_not_found_outside_window() {
        let dir = tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        fs::write(dir.path().join("20240201_scratch1.a.b.stats.gz"), b"").unwrap();

        let locator = CensusDirectory::new(dir.path(), 10).with_today(today);
        match locator.find_latest(1, 0) {
            Err(Error::CensusNotFound { volume, max_days_ago }) => {
                assert_eq!(volume, 1);
                assert_eq!(max_days_ago, 10);
            }
            other => panic!("expected CensusNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_record_date_from_timestamp() {
        let file = CensusFile {
            volume: 1,
            path: PathBuf::from("x"),
            timestamp: 1_710_072_000, // 2024-03-10T12:00:00Z
        };
        assert_eq!(file.record_date(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_out_of_range_timestamp_dates_to_epoch() {
        let file = CensusFile {
            volume: 1,
            path: PathBuf::from("x"),
            timestamp: i64::MAX,
        };
        assert_eq!(file.record_date(), NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    }
}
