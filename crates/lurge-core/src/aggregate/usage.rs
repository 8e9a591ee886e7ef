use super::filetype::FiletypeClassifier;
use crate::census::{CensusRecord, EntryKind};
use std::collections::BTreeMap;

/// Running totals for one aggregate key.
///
/// `Default` is the identity of [`UsageAggregate::merge`], and `merge` is
/// commutative and associative, so partial results from any number of
/// workers can be combined in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageAggregate {
    pub total_bytes: u64,
    pub file_count: u64,
    pub latest_mtime: i64,
    pub category_bytes: BTreeMap<String, u64>,
}

impl UsageAggregate {
    /// Fold one census record into the aggregate.
    ///
    /// Files contribute `size / links` bytes so hard-linked inodes are not
    /// counted once per name. A zero link count (a file caught mid-delete)
    /// is treated as one. Directories only bump the entry count and mtime.
    /// Modification times in the future are clamped to `now`.
    pub fn accumulate(&mut self, record: &CensusRecord, now: i64, classifier: &FiletypeClassifier) {
        match record.kind {
            EntryKind::File => {
                let size = attributed_size(record);
                self.total_bytes += size;
                self.file_count += 1;
                self.observe_mtime(record.mtime, now);
                if let Some(category) = classifier.classify(&record.path) {
                    *self.category_bytes.entry(category.to_string()).or_insert(0) += size;
                }
            }
            EntryKind::Directory => {
                self.file_count += 1;
                self.observe_mtime(record.mtime, now);
            }
            EntryKind::Symlink | EntryKind::Other => {}
        }
    }

    fn observe_mtime(&mut self, mtime: i64, now: i64) {
        self.latest_mtime = self.latest_mtime.max(mtime.min(now));
    }

    pub fn merge(&self, other: &UsageAggregate) -> UsageAggregate {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    /// In-place form of [`UsageAggregate::merge`].
    pub fn merge_from(&mut self, other: &UsageAggregate) {
        self.total_bytes += other.total_bytes;
        self.file_count += other.file_count;
        self.latest_mtime = self.latest_mtime.max(other.latest_mtime);
        for (category, bytes) in &other.category_bytes {
            *self.category_bytes.entry(category.clone()).or_insert(0) += bytes;
        }
    }
}

/// Bytes a file record contributes after hard-link attribution.
pub fn attributed_size(record: &CensusRecord) -> u64 {
    record.size_bytes / u64::from(record.link_count.max(1))
}
