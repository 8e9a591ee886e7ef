use chrono::NaiveDate;
use std::collections::BTreeMap;

use lurge_core::aggregate::{AggregateKey, ReportKind, UsageAggregate};
use lurge_core::enrich::EnrichedReport;
use lurge_core::lookup::UsageHistory;
use lurge_core::storage::queries::Dimension;
use lurge_core::storage::Database;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
}

fn usage(total_bytes: u64, file_count: u64) -> UsageAggregate {
    UsageAggregate {
        total_bytes,
        file_count,
        latest_mtime: 0,
        category_bytes: BTreeMap::new(),
    }
}

fn group_report(base_path: &str, group: Option<&str>, used: u64) -> EnrichedReport {
    EnrichedReport {
        key: AggregateKey::Group {
            group_id: 42,
            base_path: base_path.to_string(),
        },
        usage: usage(used, 3),
        display_path: Some(base_path.to_string()),
        gid: Some(42),
        group_name: group.map(str::to_string),
        pi_name: Some("Smith".to_string()),
        user_name: None,
        quota_bytes: Some(10_000),
        relative_mtime_days: 1.5,
        warning_level: 2,
    }
}

fn directory_report(subdir: &str, categories: &[(&str, u64)]) -> EnrichedReport {
    let mut usage = usage(4096, 2);
    usage.category_bytes = categories.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    EnrichedReport {
        key: AggregateKey::Directory {
            group_id: 42,
            base_path: "/lustre/scratch1/teams/g".to_string(),
            subdir: subdir.to_string(),
        },
        usage,
        display_path: Some("/lustre/scratch1/teams/g".to_string()),
        gid: Some(42),
        group_name: Some("team-g".to_string()),
        pi_name: None,
        user_name: None,
        quota_bytes: None,
        relative_mtime_days: 0.0,
        warning_level: 1,
    }
}

fn user_report(uid: u32, name: Option<&str>) -> EnrichedReport {
    EnrichedReport {
        key: AggregateKey::User { user_id: uid },
        usage: usage(100, 1),
        display_path: None,
        gid: None,
        group_name: None,
        pi_name: None,
        user_name: name.map(str::to_string),
        quota_bytes: None,
        relative_mtime_days: 3.2,
        warning_level: 1,
    }
}

#[test]
fn test_get_or_insert_is_case_insensitive() {
    let db = Database::open_in_memory().unwrap();
    let a = db.get_or_insert_named(Dimension::UnixGroup, "Team-G").unwrap();
    let b = db.get_or_insert_named(Dimension::UnixGroup, "team-g").unwrap();
    let c = db.get_or_insert_named(Dimension::UnixGroup, "team-h").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(db.find_named(Dimension::Pi, "nobody").unwrap(), None);
}

#[test]
fn test_persist_group_snapshot_and_read_back() {
    let db = Database::open_in_memory().unwrap();
    let mut shared = group_report("/lustre/scratch1/teams/h", None, 2_000);
    shared.gid = Some(90_001);
    let reports = vec![group_report("/lustre/scratch1/teams/g", Some("team-g"), 1_000), shared];

    assert!(!db.already_persisted(ReportKind::Group, 1, date(10)).unwrap());
    let written = db.persist_snapshot(ReportKind::Group, 1, date(10), &reports).unwrap();
    assert_eq!(written, 2);
    assert!(db.already_persisted(ReportKind::Group, 1, date(10)).unwrap());
    assert!(!db.already_persisted(ReportKind::Group, 2, date(10)).unwrap());
    assert!(!db.already_persisted(ReportKind::User, 1, date(10)).unwrap());

    let rows = db.get_group_usage(1).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].volume, "scratch1");
    assert_eq!(rows[0].base_directory, "/lustre/scratch1/teams/g");
    assert_eq!(rows[0].group_name.as_deref(), Some("team-g"));
    assert_eq!(rows[0].pi_name.as_deref(), Some("Smith"));
    assert_eq!(rows[0].used, 1_000);
    assert_eq!(rows[0].quota, Some(10_000));
    assert_eq!(rows[0].warning_level, 2);
    assert_eq!(rows[0].record_date, date(10));
    assert_eq!(rows[0].gid, 42);
    assert_eq!(rows[1].group_name, None);
    // Stored under the gid the enricher chose, not the key's
    assert_eq!(rows[1].gid, 90_001);
}

#[test]
fn test_group_snapshot_replaces_same_date_and_keeps_history() {
    let db = Database::open_in_memory().unwrap();
    let base = "/lustre/scratch1/teams/g";

    db.persist_snapshot(ReportKind::Group, 1, date(1), &[group_report(base, Some("team-g"), 100)])
        .unwrap();
    db.persist_snapshot(ReportKind::Group, 1, date(5), &[group_report(base, Some("team-g"), 500)])
        .unwrap();
    // Same date again replaces rather than duplicates
    db.persist_snapshot(ReportKind::Group, 1, date(5), &[group_report(base, Some("team-g"), 550)])
        .unwrap();

    assert_eq!(db.count_rows(ReportKind::Group).unwrap(), 2);

    let history = db.load_historical_usage().unwrap();
    assert_eq!(history.history("team-g", base), &[(date(1), 100), (date(5), 550)]);
}

#[test]
fn test_directory_snapshot_replaces_whole_volume() {
    let db = Database::open_in_memory().unwrap();
    let first = vec![
        directory_report("data", &[("BAM", 1024), ("CRAM", 2048)]),
        directory_report("old", &[]),
    ];
    db.persist_snapshot(ReportKind::Directory, 1, date(1), &first).unwrap();
    db.persist_snapshot(ReportKind::Directory, 2, date(1), &[directory_report("other", &[])])
        .unwrap();

    let rows = db.get_directory_usage(1).unwrap();
    assert_eq!(rows.len(), 2);
    let data = rows.iter().find(|r| r.subdirectory == "data").unwrap();
    let filetypes = db.get_directory_filetypes(data.id).unwrap();
    assert_eq!(filetypes.len(), 2);
    assert_eq!(filetypes[0].filetype, "BAM");
    assert_eq!(filetypes[0].size, 1024);

    let second = vec![directory_report("data", &[("VCF", 10)])];
    db.persist_snapshot(ReportKind::Directory, 1, date(2), &second).unwrap();

    let rows = db.get_directory_usage(1).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record_date, date(2));
    // Old category rows went with their directory
    assert!(db.get_directory_filetypes(data.id).unwrap().is_empty());
    let filetypes = db.get_directory_filetypes(rows[0].id).unwrap();
    assert_eq!(filetypes.len(), 1);
    assert_eq!(filetypes[0].filetype, "VCF");

    // Other volumes are untouched
    assert_eq!(db.get_directory_usage(2).unwrap().len(), 1);
}

#[test]
fn test_user_snapshot_and_other_kinds_ignored() {
    let db = Database::open_in_memory().unwrap();
    let reports = vec![
        user_report(500, Some("ab12")),
        user_report(501, None),
        group_report("/lustre/scratch1/teams/g", Some("team-g"), 1),
    ];
    let written = db.persist_snapshot(ReportKind::User, 1, date(3), &reports).unwrap();
    assert_eq!(written, 2);
    assert_eq!(db.count_rows(ReportKind::Group).unwrap(), 0);

    let rows = db.get_user_usage(1).unwrap();
    assert_eq!(rows[0].uid, 500);
    assert_eq!(rows[0].user_name.as_deref(), Some("ab12"));
    assert_eq!(rows[0].last_modified, 3.2);
    assert_eq!(rows[1].user_name, None);
}

#[test]
fn test_snapshot_larger_than_one_chunk() {
    let db = Database::open_in_memory().unwrap();
    let reports: Vec<EnrichedReport> = (0..1_234).map(|uid| user_report(uid, None)).collect();
    let written = db.persist_snapshot(ReportKind::User, 7, date(1), &reports).unwrap();
    assert_eq!(written, 1_234);
    assert_eq!(db.count_rows(ReportKind::User).unwrap(), 1_234);
}

#[test]
fn test_interrupted_snapshot_is_not_counted_as_stored() {
    let db = Database::open_in_memory().unwrap();
    let old: Vec<EnrichedReport> = (0..3).map(|uid| user_report(uid, None)).collect();
    db.persist_snapshot(ReportKind::User, 1, date(1), &old).unwrap();

    // Fail the write once the table holds 600 rows, i.e. in the second chunk
    db.connection()
        .execute_batch(
            "CREATE TRIGGER disk_full BEFORE INSERT ON user_usage \
             WHEN (SELECT COUNT(*) FROM user_usage) >= 600 \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
    let reports: Vec<EnrichedReport> = (0..1_200).map(|uid| user_report(uid, None)).collect();
    assert!(db.persist_snapshot(ReportKind::User, 1, date(2), &reports).is_err());

    assert!(!db.already_persisted(ReportKind::User, 1, date(2)).unwrap());
    assert!(db.already_persisted(ReportKind::User, 1, date(1)).unwrap());
    let rows = db.get_user_usage(1).unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.record_date == date(1)));

    // The retry discards the half-written rows
    db.connection().execute_batch("DROP TRIGGER disk_full;").unwrap();
    let written = db.persist_snapshot(ReportKind::User, 1, date(2), &reports).unwrap();
    assert_eq!(written, 1_200);
    assert!(db.already_persisted(ReportKind::User, 1, date(2)).unwrap());
    assert_eq!(db.count_rows(ReportKind::User).unwrap(), 1_203);
    assert_eq!(db.get_user_usage(1).unwrap().len(), 1_203);
}

#[test]
fn test_interrupted_directory_snapshot_keeps_previous_one() {
    let db = Database::open_in_memory().unwrap();
    db.persist_snapshot(ReportKind::Directory, 1, date(1), &[directory_report("data", &[("BAM", 1)])])
        .unwrap();

    db.connection()
        .execute_batch(
            "CREATE TRIGGER disk_full BEFORE INSERT ON directory_usage \
             WHEN (SELECT COUNT(*) FROM directory_usage) >= 300 \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
    let reports: Vec<EnrichedReport> = (0..600)
        .map(|i| directory_report(&format!("d{}", i), &[]))
        .collect();
    assert!(db.persist_snapshot(ReportKind::Directory, 1, date(2), &reports).is_err());

    let rows = db.get_directory_usage(1).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].subdirectory, "data");
    assert_eq!(rows[0].record_date, date(1));
    assert!(!db.already_persisted(ReportKind::Directory, 1, date(2)).unwrap());
}

#[test]
fn test_truncate_all_clears_reports() {
    let db = Database::open_in_memory().unwrap();
    db.persist_snapshot(ReportKind::User, 1, date(1), &[user_report(1, None)])
        .unwrap();
    db.truncate_all().unwrap();
    assert_eq!(db.count_rows(ReportKind::User).unwrap(), 0);
}

#[test]
fn test_reopen_file_database_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lurge.db");
    let path = path.to_str().unwrap();
    {
        let db = Database::open(path).unwrap();
        db.persist_snapshot(ReportKind::User, 1, date(1), &[user_report(1, Some("ab12"))])
            .unwrap();
    }
    let db = Database::open(path).unwrap();
    assert_eq!(db.count_rows(ReportKind::User).unwrap(), 1);
}
