use crate::aggregate::{AggregateKey, ReportKind};
use crate::census::{CensusRecord, EntryKind};
use crate::error::Error;
use std::path::Path;
use tracing::{debug, warn};

/// A group-owned top-level directory that reports are rooted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDirectory {
    pub group_id: u32,
    pub prefix: String,
}

/// Ordered `(gid, prefix)` pairs. A group may own many base directories and
/// a base directory may be listed under many groups; the first entry
/// matching both gid and path prefix wins.
#[derive(Debug, Clone, Default)]
pub struct BaseDirectoryTable {
    entries: Vec<BaseDirectory>,
}

impl BaseDirectoryTable {
    pub fn new(entries: Vec<BaseDirectory>) -> Self {
        Self { entries }
    }

    /// Load a tab-separated `gid<TAB>path` file. Lines that do not parse are
    /// logged and skipped.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_path(path)?;

        let mut entries = Vec::new();
        for (line_no, row) in reader.records().enumerate() {
            let row = row?;
            match (row.get(0).map(str::trim).map(str::parse::<u32>), row.get(1)) {
                (Some(Ok(group_id)), Some(prefix)) if !prefix.trim().is_empty() => {
                    entries.push(BaseDirectory {
                        group_id,
                        prefix: prefix.trim().to_string(),
                    });
                }
                _ => warn!(
                    "Skipping malformed base directory line {} in {}",
                    line_no + 1,
                    path.display()
                ),
            }
        }
        debug!("Loaded {} base directories from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, group_id: u32, path: &str) -> Option<&BaseDirectory> {
        self.entries
            .iter()
            .find(|dir| dir.group_id == group_id && path.starts_with(&dir.prefix))
    }
}

/// The keys one record contributes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub keys: Vec<AggregateKey>,
    /// Whether the record fell under a tracked base directory.
    pub matched_base: bool,
}

/// Maps records to aggregate keys for the report kinds enabled in a pass.
#[derive(Debug, Clone)]
pub struct Partitioner {
    table: BaseDirectoryTable,
    deep_nest_dirs: Vec<String>,
    kinds: Vec<ReportKind>,
}

impl Partitioner {
    pub fn new(table: BaseDirectoryTable, deep_nest_dirs: Vec<String>, kinds: Vec<ReportKind>) -> Self {
        Self {
            table,
            deep_nest_dirs,
            kinds,
        }
    }

    pub fn kinds(&self) -> &[ReportKind] {
        &self.kinds
    }

    fn wants(&self, kind: ReportKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn partition(&self, record: &CensusRecord) -> Partition {
        let mut partition = Partition::default();

        if !matches!(record.kind, EntryKind::File | EntryKind::Directory) {
            return partition;
        }

        if self.wants(ReportKind::User) {
            partition.keys.push(AggregateKey::User {
                user_id: record.owner_id,
            });
        }

        let Some(base) = self.table.find(record.group_id, &record.path) else {
            return partition;
        };
        partition.matched_base = true;

        if self.wants(ReportKind::Group) {
            partition.keys.push(AggregateKey::Group {
                group_id: base.group_id,
                base_path: base.prefix.clone(),
            });
        }

        if self.wants(ReportKind::Directory) {
            if let Some(subdir) = self.subdirectory(&record.path[base.prefix.len()..], record.kind) {
                partition.keys.push(AggregateKey::Directory {
                    group_id: base.group_id,
                    base_path: base.prefix.clone(),
                    subdir,
                });
            }
        }

        partition
    }

    /// Name of the report subdirectory for the part of a path below its base
    /// directory. Entries directly under the base are grouped by their own
    /// name (directories) or as `.` (files); entries below a deep-nest
    /// directory such as `users/` are grouped one level further down.
    pub fn subdirectory(&self, remainder: &str, kind: EntryKind) -> Option<String> {
        let mut segments = remainder.trim_start_matches('/').split('/').filter(|s| !s.is_empty());

        let first = segments.next()?;
        match segments.next() {
            None if kind == EntryKind::Directory => Some(first.to_string()),
            None => Some(".".to_string()),
            Some(second) if self.deep_nest_dirs.iter().any(|d| d == first) => {
                Some(format!("{}/{}", first, second))
            }
            Some(_) => Some(first.to_string()),
        }
    }
}
