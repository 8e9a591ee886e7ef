use crate::error::Error;
use ahash::AHashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Names attached to a unix group. Either may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIdentity {
    pub group_name: Option<String>,
    pub pi_name: Option<String>,
}

pub trait IdentityResolver: Send + Sync {
    fn resolve_group(&self, group_id: u32) -> GroupIdentity;
    fn resolve_user(&self, user_id: u32) -> Option<String>;
}

/// Directory snapshot exported to flat files:
/// groups as `gid<TAB>group_name<TAB>pi_surname` (`-` or empty for no PI),
/// users as `uid<TAB>user_name`.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    groups: AHashMap<u32, GroupIdentity>,
    users: AHashMap<u32, String>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group_id: u32, group_name: &str, pi_name: Option<&str>) -> Self {
        self.groups.insert(
            group_id,
            GroupIdentity {
                group_name: Some(group_name.to_string()),
                pi_name: pi_name.map(str::to_string),
            },
        );
        self
    }

    pub fn with_user(mut self, user_id: u32, user_name: &str) -> Self {
        self.users.insert(user_id, user_name.to_string());
        self
    }

    pub fn load(groups_path: Option<&Path>, users_path: Option<&Path>) -> Result<Self, Error> {
        let mut table = Self::new();

        if let Some(path) = groups_path {
            for row in read_tsv(path)? {
                let Some(Ok(gid)) = row.first().map(|s| s.parse::<u32>()) else {
                    warn!("Skipping group line without a numeric gid in {}", path.display());
                    continue;
                };
                table.groups.insert(
                    gid,
                    GroupIdentity {
                        group_name: non_placeholder(row.get(1)),
                        pi_name: non_placeholder(row.get(2)),
                    },
                );
            }
        }

        if let Some(path) = users_path {
            for row in read_tsv(path)? {
                match (row.first().map(|s| s.parse::<u32>()), non_placeholder(row.get(1))) {
                    (Some(Ok(uid)), Some(name)) => {
                        table.users.insert(uid, name);
                    }
                    _ => warn!("Skipping malformed user line in {}", path.display()),
                }
            }
        }

        debug!(
            "Identity table: {} groups, {} users",
            table.groups.len(),
            table.users.len()
        );
        Ok(table)
    }
}

impl IdentityResolver for IdentityTable {
    fn resolve_group(&self, group_id: u32) -> GroupIdentity {
        self.groups.get(&group_id).cloned().unwrap_or_default()
    }

    fn resolve_user(&self, user_id: u32) -> Option<String> {
        self.users.get(&user_id).cloned()
    }
}

fn read_tsv(path: &Path) -> Result<Vec<Vec<String>>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(rows)
}

fn non_placeholder(field: Option<&String>) -> Option<String> {
    field
        .filter(|f| !f.is_empty() && f.as_str() != "-")
        .cloned()
}
