pub mod warning;

use crate::aggregate::{AggregateKey, AggregateSet, ReportKind, UsageAggregate};
use crate::census::CensusFile;
use crate::directory::{PathRemapper, PseudoGroups};
use crate::lookup::{GroupIdentity, IdentityResolver, QuotaLookup, UsageHistory};
use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;

pub use warning::{UsageTrend, WarningPolicy, WarningRule, WarningTier};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A merged aggregate with everything the persisted row needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedReport {
    pub key: AggregateKey,
    pub usage: UsageAggregate,
    /// Base path after alias remapping; `None` for user rows.
    pub display_path: Option<String>,
    /// Group id the row is stored under. A pseudo group replaces the owning
    /// gid with its own; `None` for user rows.
    pub gid: Option<u32>,
    pub group_name: Option<String>,
    pub pi_name: Option<String>,
    pub user_name: Option<String>,
    pub quota_bytes: Option<u64>,
    pub relative_mtime_days: f64,
    pub warning_level: u8,
}

/// Enriched rows of one pass, split by report table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSet {
    pub group: Vec<EnrichedReport>,
    pub directory: Vec<EnrichedReport>,
    pub user: Vec<EnrichedReport>,
}

impl ReportSet {
    pub fn for_kind(&self, kind: ReportKind) -> &[EnrichedReport] {
        match kind {
            ReportKind::Group => &self.group,
            ReportKind::Directory => &self.directory,
            ReportKind::User => &self.user,
        }
    }

    pub fn len(&self) -> usize {
        self.group.len() + self.directory.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Days between the census snapshot and the newest mtime, to one decimal
/// place. Mtimes after the snapshot (clock skew) count as zero.
pub fn relative_mtime_days(census_timestamp: i64, latest_mtime: i64) -> f64 {
    let days = (census_timestamp - latest_mtime) as f64 / SECONDS_PER_DAY;
    ((days * 10.0).round() / 10.0).max(0.0)
}

/// Attaches external lookups to merged aggregates. All collaborators are
/// read-only for the lifetime of the enricher.
pub struct Enricher<'a> {
    pub identity: &'a dyn IdentityResolver,
    pub quotas: &'a dyn QuotaLookup,
    pub history: &'a dyn UsageHistory,
    pub remapper: &'a PathRemapper,
    pub pseudo_groups: &'a PseudoGroups,
    pub warnings: &'a WarningPolicy,
    pub today: NaiveDate,
}

impl Enricher<'_> {
    pub fn enrich(&self, set: &AggregateSet, census: &CensusFile) -> ReportSet {
        let entries: Vec<(&AggregateKey, &UsageAggregate)> = set.iter().collect();
        let reports: Vec<EnrichedReport> = entries
            .par_iter()
            .map(|(key, usage)| self.enrich_one(key, usage, census))
            .collect();

        let mut out = ReportSet::default();
        for report in reports {
            match report.key.kind() {
                ReportKind::Group => out.group.push(report),
                ReportKind::Directory => out.directory.push(report),
                ReportKind::User => out.user.push(report),
            }
        }
        debug!(
            "Enriched volume {}: {} group, {} directory, {} user rows",
            census.volume,
            out.group.len(),
            out.directory.len(),
            out.user.len()
        );
        out
    }

    pub fn enrich_one(&self, key: &AggregateKey, usage: &UsageAggregate, census: &CensusFile) -> EnrichedReport {
        let mut report = EnrichedReport {
            key: key.clone(),
            usage: usage.clone(),
            display_path: None,
            gid: None,
            group_name: None,
            pi_name: None,
            user_name: None,
            quota_bytes: None,
            relative_mtime_days: relative_mtime_days(census.timestamp, usage.latest_mtime),
            warning_level: self.warnings.default_level,
        };

        match key {
            AggregateKey::User { user_id } => {
                report.user_name = self.identity.resolve_user(*user_id);
            }
            AggregateKey::Group { group_id, base_path } | AggregateKey::Directory { group_id, base_path, .. } => {
                let display_path = self.remapper.remap(base_path);
                let (gid, identity) = self.group_identity(*group_id, &display_path);
                report.quota_bytes = identity
                    .group_name
                    .as_deref()
                    .and_then(|name| self.quotas.quota(name));

                if key.kind() == ReportKind::Group {
                    if let Some(group_name) = identity.group_name.as_deref() {
                        let trend = UsageTrend {
                            usage: usage.total_bytes,
                            census_date: census.record_date(),
                            today: self.today,
                            history: self.history.history(group_name, &display_path),
                        };
                        report.warning_level = self.warnings.level(&trend, report.quota_bytes);
                    }
                }

                report.group_name = identity.group_name;
                report.pi_name = identity.pi_name;
                report.gid = Some(gid);
                report.display_path = Some(display_path);
            }
        }

        report
    }

    fn group_identity(&self, group_id: u32, display_path: &str) -> (u32, GroupIdentity) {
        match self.pseudo_groups.lookup(display_path) {
            Some(pseudo) => (
                pseudo.group_id,
                GroupIdentity {
                    group_name: Some(pseudo.group_name.clone()),
                    pi_name: pseudo.pi_name.clone(),
                },
            ),
            None => (group_id, self.identity.resolve_group(group_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::PseudoGroup;
    use crate::lookup::{HistoricalUsage, IdentityTable, QuotaTable};
    use std::path::PathBuf;

    #[test]
    fn test_relative_mtime_rounds_and_clamps() {
        assert_eq!(relative_mtime_days(86_400 * 10, 0), 10.0);
        assert_eq!(relative_mtime_days(86_400 + 8_640 * 3, 0), 1.3);
        assert_eq!(relative_mtime_days(100, 1_000), 0.0);
    }

    fn census() -> CensusFile {
        CensusFile {
            volume: 1,
            path: PathBuf::from("census.stats.gz"),
            timestamp: 1_718_064_000, // 2024-06-11T00:00:00Z
        }
    }

    #[test]
    fn test_enrich_group_row() {
        let identity = IdentityTable::new().with_group(42, "team-g", Some("Smith"));
        let quotas = QuotaTable::new().with_quota("team-g", 1_000);
        let mut history = HistoricalUsage::new();
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        history.record("team-g", "/vol/teams/g", d(1), 0);
        history.record("team-g", "/vol/teams/g", d(6), 400);
        let remapper = PathRemapper::default();
        let pseudo = PseudoGroups::default();
        let warnings = WarningPolicy::default();
        let enricher = Enricher {
            identity: &identity,
            quotas: &quotas,
            history: &history,
            remapper: &remapper,
            pseudo_groups: &pseudo,
            warnings: &warnings,
            today: d(11),
        };

        let usage = UsageAggregate {
            total_bytes: 900,
            file_count: 3,
            latest_mtime: 1_718_064_000 - 86_400 * 2,
            ..Default::default()
        };
        let key = AggregateKey::Group {
            group_id: 42,
            base_path: "/vol/teams/g".to_string(),
        };
        let report = enricher.enrich_one(&key, &usage, &census());

        assert_eq!(report.group_name.as_deref(), Some("team-g"));
        assert_eq!(report.pi_name.as_deref(), Some("Smith"));
        assert_eq!(report.quota_bytes, Some(1_000));
        assert_eq!(report.relative_mtime_days, 2.0);
        assert_eq!(report.display_path.as_deref(), Some("/vol/teams/g"));
        // 90/day from d1 to d11; 3 days => 1170 > 950
        assert_eq!(report.warning_level, 3);
    }

    #[test]
    fn test_enrich_unresolved_and_pseudo_groups() {
        let identity = IdentityTable::new().with_user(501, "ab12");
        let quotas = QuotaTable::new();
        let history = HistoricalUsage::new();
        let remapper = PathRemapper::default();
        let pseudo = PseudoGroups::new(vec![PseudoGroup {
            path_prefix: "/vol/shared".to_string(),
            group_id: 9,
            group_name: "shared".to_string(),
            pi_name: Some("Jones".to_string()),
        }]);
        let warnings = WarningPolicy::default();
        let enricher = Enricher {
            identity: &identity,
            quotas: &quotas,
            history: &history,
            remapper: &remapper,
            pseudo_groups: &pseudo,
            warnings: &warnings,
            today: NaiveDate::from_ymd_opt(2024, 6, 11).unwrap(),
        };
        let usage = UsageAggregate::default();

        let unknown = enricher.enrich_one(
            &AggregateKey::Group {
                group_id: 77,
                base_path: "/vol/teams/x".to_string(),
            },
            &usage,
            &census(),
        );
        assert_eq!(unknown.gid, Some(77));
        assert_eq!(unknown.group_name, None);
        assert_eq!(unknown.pi_name, None);
        assert_eq!(unknown.quota_bytes, None);
        assert_eq!(unknown.warning_level, 1);

        let shared = enricher.enrich_one(
            &AggregateKey::Directory {
                group_id: 77,
                base_path: "/vol/shared".to_string(),
                subdir: "data".to_string(),
            },
            &usage,
            &census(),
        );
        assert_eq!(shared.gid, Some(9));
        assert_eq!(shared.group_name.as_deref(), Some("shared"));
        assert_eq!(shared.pi_name.as_deref(), Some("Jones"));

        let user = enricher.enrich_one(&AggregateKey::User { user_id: 501 }, &usage, &census());
        assert_eq!(user.user_name.as_deref(), Some("ab12"));
        assert_eq!(user.display_path, None);
        assert_eq!(user.gid, None);
    }
}
