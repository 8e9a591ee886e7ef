use crate::error::Error;
use ahash::AHashMap;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

pub trait QuotaLookup: Send + Sync {
    /// Size quota in bytes, or `None` when the group has no quota entry.
    fn quota(&self, group_name: &str) -> Option<u64>;
}

#[derive(Debug, Deserialize)]
struct QuotaRow {
    group: String,
    /// KiB
    limit: u64,
}

/// Group size quotas for one volume, read from the quota management
/// export `scratch{volume}` (CSV with `group,limit` columns, limit in KiB).
#[derive(Debug, Clone, Default)]
pub struct QuotaTable {
    quotas: AHashMap<String, u64>,
}

impl QuotaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, group_name: &str, bytes: u64) -> Self {
        self.quotas.insert(group_name.to_string(), bytes);
        self
    }

    /// A missing export leaves the volume without quotas rather than failing
    /// the pass.
    pub fn load(quota_dir: &Path, volume: u32) -> Result<Self, Error> {
        let path = quota_dir.join(format!("scratch{}", volume));
        if !path.exists() {
            warn!("No quota file at {}; quotas for volume {} unknown", path.display(), volume);
            return Ok(Self::new());
        }

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(&path)?;
        let mut quotas = AHashMap::new();
        for row in reader.deserialize::<QuotaRow>() {
            match row {
                Ok(row) => match row.limit.checked_mul(1024) {
                    Some(bytes) => {
                        quotas.insert(row.group, bytes);
                    }
                    None => warn!(
                        "Skipping quota for {} in {}: {} KiB is out of range",
                        row.group,
                        path.display(),
                        row.limit
                    ),
                },
                Err(e) => warn!("Skipping quota row in {}: {}", path.display(), e),
            }
        }
        debug!("Loaded {} quotas for volume {}", quotas.len(), volume);
        Ok(Self { quotas })
    }
}

impl QuotaLookup for QuotaTable {
    fn quota(&self, group_name: &str) -> Option<u64> {
        self.quotas.get(group_name).copied()
    }
}
