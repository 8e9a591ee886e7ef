use serde::Deserialize;
use std::fmt;

/// The three report tables a pass can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Group,
    Directory,
    User,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Group, ReportKind::Directory, ReportKind::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Group => "group",
            ReportKind::Directory => "directory",
            ReportKind::User => "user",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one row of an output report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateKey {
    Group {
        group_id: u32,
        base_path: String,
    },
    Directory {
        group_id: u32,
        base_path: String,
        subdir: String,
    },
    User {
        user_id: u32,
    },
}

impl AggregateKey {
    pub fn kind(&self) -> ReportKind {
        match self {
            AggregateKey::Group { .. } => ReportKind::Group,
            AggregateKey::Directory { .. } => ReportKind::Directory,
            AggregateKey::User { .. } => ReportKind::User,
        }
    }

    pub fn group_id(&self) -> Option<u32> {
        match self {
            AggregateKey::Group { group_id, .. } | AggregateKey::Directory { group_id, .. } => {
                Some(*group_id)
            }
            AggregateKey::User { .. } => None,
        }
    }

    pub fn base_path(&self) -> Option<&str> {
        match self {
            AggregateKey::Group { base_path, .. } | AggregateKey::Directory { base_path, .. } => {
                Some(base_path)
            }
            AggregateKey::User { .. } => None,
        }
    }
}
