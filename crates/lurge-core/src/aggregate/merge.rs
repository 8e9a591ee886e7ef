use super::key::{AggregateKey, ReportKind};
use super::usage::UsageAggregate;
use ahash::AHashMap;
use std::collections::BTreeMap;

/// Per-worker accumulation map. Unordered; only ever merged, never reported.
pub type AggregateMap = AHashMap<AggregateKey, UsageAggregate>;

/// Canonical merged result of one pass, ordered by key so two passes over
/// the same records compare equal however the work was split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSet {
    entries: BTreeMap<AggregateKey, UsageAggregate>,
}

impl AggregateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one partial map into the set, creating entries on first touch.
    pub fn absorb(&mut self, partial: AggregateMap) {
        for (key, usage) in partial {
            match self.entries.get_mut(&key) {
                Some(existing) => existing.merge_from(&usage),
                None => {
                    self.entries.insert(key, usage);
                }
            }
        }
    }

    pub fn get(&self, key: &AggregateKey) -> Option<&UsageAggregate> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AggregateKey, &UsageAggregate)> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: ReportKind) -> impl Iterator<Item = (&AggregateKey, &UsageAggregate)> {
        self.entries.iter().filter(move |(key, _)| key.kind() == kind)
    }

    pub fn count_of_kind(&self, kind: ReportKind) -> usize {
        self.of_kind(kind).count()
    }
}

impl FromIterator<AggregateMap> for AggregateSet {
    fn from_iter<I: IntoIterator<Item = AggregateMap>>(maps: I) -> Self {
        let mut set = AggregateSet::new();
        for map in maps {
            set.absorb(map);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(base: &str) -> AggregateKey {
        AggregateKey::Group {
            group_id: 1,
            base_path: base.to_string(),
        }
    }

    fn usage(bytes: u64, files: u64, mtime: i64) -> UsageAggregate {
        UsageAggregate {
            total_bytes: bytes,
            file_count: files,
            latest_mtime: mtime,
            ..Default::default()
        }
    }

    #[test]
    fn test_absorb_merges_overlapping_keys() {
        let mut a = AggregateMap::new();
        a.insert(key("/a"), usage(10, 1, 5));
        a.insert(key("/b"), usage(1, 1, 1));
        let mut b = AggregateMap::new();
        b.insert(key("/a"), usage(20, 2, 9));

        let set: AggregateSet = vec![a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&key("/a")), Some(&usage(30, 3, 9)));
        assert_eq!(set.get(&key("/b")), Some(&usage(1, 1, 1)));
    }

    #[test]
    fn test_of_kind_filters() {
        let mut m = AggregateMap::new();
        m.insert(key("/a"), usage(1, 1, 1));
        m.insert(AggregateKey::User { user_id: 7 }, usage(1, 1, 1));
        let set: AggregateSet = std::iter::once(m).collect();
        assert_eq!(set.count_of_kind(ReportKind::Group), 1);
        assert_eq!(set.count_of_kind(ReportKind::User), 1);
        assert_eq!(set.count_of_kind(ReportKind::Directory), 0);
    }
}
