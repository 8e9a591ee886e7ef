use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use proptest::prelude::*;

use lurge_core::aggregate::{AggregateKey, AggregateSet, FiletypeClassifier, FiletypeRule, ReportKind, UsageAggregate};
use lurge_core::census::record::encode_line;
use lurge_core::partition::{BaseDirectory, BaseDirectoryTable, Partitioner};
use lurge_core::pipeline::{merge_partials, PassContext, VolumeController, WorkerPool};
use lurge_core::SilentReporter;

const NOW: i64 = 1_718_064_000;
const BASE: &str = "/lustre/scratch1/teams/g";

fn context(classifier: FiletypeClassifier) -> Arc<PassContext> {
    let table = BaseDirectoryTable::new(vec![BaseDirectory {
        group_id: 42,
        prefix: BASE.to_string(),
    }]);
    Arc::new(PassContext {
        volume: 1,
        partitioner: Partitioner::new(table, vec!["users".to_string()], ReportKind::ALL.to_vec()),
        classifier,
        now: NOW,
    })
}

fn run_pooled(ctx: Arc<PassContext>, lines: &[String], workers: usize, batch_size: usize) -> AggregateSet {
    let pool = WorkerPool::spawn(ctx, workers).unwrap();
    let input: Vec<io::Result<String>> = lines.iter().cloned().map(Ok).collect();
    let partials = VolumeController::new(pool, batch_size)
        .run(input, &SilentReporter)
        .unwrap();
    assert_eq!(partials.len(), workers);
    merge_partials(partials).0
}

fn group_key() -> AggregateKey {
    AggregateKey::Group {
        group_id: 42,
        base_path: BASE.to_string(),
    }
}

fn directory_key(subdir: &str) -> AggregateKey {
    AggregateKey::Directory {
        group_id: 42,
        base_path: BASE.to_string(),
        subdir: subdir.to_string(),
    }
}

#[test]
fn test_group_and_directory_totals() {
    let classifier = FiletypeClassifier::new(&[
        FiletypeRule::new("BAM", r"\.bam$"),
        FiletypeRule::new("CRAM", r"\.cram$"),
    ])
    .unwrap();
    let lines = vec![
        encode_line(BASE, 4096, 500, 42, NOW - 300, 'd', 1, 3),
        encode_line(&format!("{}/data/a.bam", BASE), 2048, 500, 42, NOW - 200, 'f', 2, 1),
        encode_line(&format!("{}/data/b.cram", BASE), 4096, 501, 42, NOW - 100, 'f', 3, 2),
    ];

    let set = run_pooled(context(classifier), &lines, 2, 1);

    let group = set.get(&group_key()).unwrap();
    assert_eq!(group.total_bytes, 4096);
    assert_eq!(group.file_count, 3);
    assert_eq!(group.latest_mtime, NOW - 100);
    assert_eq!(
        group.category_bytes,
        BTreeMap::from([("BAM".to_string(), 2048), ("CRAM".to_string(), 2048)])
    );

    let data = set.get(&directory_key("data")).unwrap();
    assert_eq!(data.total_bytes, 4096);
    assert_eq!(data.file_count, 2);
    assert_eq!(set.count_of_kind(ReportKind::Directory), 1);

    // Users are whole-volume
    assert_eq!(set.count_of_kind(ReportKind::User), 2);
    let bob = set.get(&AggregateKey::User { user_id: 501 }).unwrap();
    assert_eq!(bob.total_bytes, 2048);
}

#[test]
fn test_malformed_lines_are_counted_not_fatal() {
    let ctx = context(FiletypeClassifier::empty());
    let lines = vec![
        "garbage".to_string(),
        encode_line(&format!("{}/x", BASE), 10, 500, 42, 0, 'f', 1, 1),
        "a\tb\tc\td\te\tf\tg\th\ti\tj\tk".to_string(),
        encode_line("/somewhere/else", 10, 500, 7, 0, 'f', 2, 1),
    ];
    let pool = WorkerPool::spawn(Arc::clone(&ctx), 3).unwrap();
    let partials = VolumeController::new(pool, 2)
        .run(lines.into_iter().map(Ok), &SilentReporter)
        .unwrap();
    let (set, stats) = merge_partials(partials);

    assert_eq!(stats.lines, 4);
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.unmatched, 1);
    assert_eq!(set.get(&group_key()).unwrap().file_count, 1);
}

#[test]
fn test_future_mtime_is_clamped() {
    let ctx = context(FiletypeClassifier::empty());
    let lines = vec![encode_line(&format!("{}/f", BASE), 1, 500, 42, NOW + 86_400, 'f', 1, 1)];
    let set = run_pooled(ctx, &lines, 1, 10);
    assert_eq!(set.get(&group_key()).unwrap().latest_mtime, NOW);
}

fn census_line() -> impl Strategy<Value = String> {
    let subdirs = prop::sample::select(vec!["", "data/", "users/ann/", "users/bob/deep/", "tmp/x/"]);
    (subdirs, 0u64..1_000_000, 0u32..4, 0i64..2_000_000_000, prop::bool::weighted(0.9), 0u32..3)
        .prop_map(|(subdir, size, links, mtime, is_file, uid)| {
            let name = if is_file { "f.bam" } else { "d" };
            let kind = if is_file { 'f' } else { 'd' };
            encode_line(
                &format!("{}/{}{}", BASE, subdir, name),
                size,
                500 + uid,
                42,
                mtime,
                kind,
                1,
                links,
            )
        })
}

fn usage_aggregate() -> impl Strategy<Value = UsageAggregate> {
    (
        0u64..1 << 40,
        0u64..1 << 30,
        0i64..4_000_000_000,
        prop::collection::btree_map(prop::sample::select(vec!["BAM", "CRAM", "VCF"]), 0u64..1 << 40, 0..3),
    )
        .prop_map(|(total_bytes, file_count, latest_mtime, categories)| UsageAggregate {
            total_bytes,
            file_count,
            latest_mtime,
            category_bytes: categories.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pooled_pass_matches_sequential(
        lines in prop::collection::vec(census_line(), 0..200),
        workers in 1usize..6,
        batch_size in 1usize..40,
    ) {
        let ctx = context(FiletypeClassifier::new(&[FiletypeRule::new("BAM", r"\.bam$")]).unwrap());
        let (expected, _) = ctx.accumulate_all(lines.iter().map(String::as_str));
        let pooled = run_pooled(ctx, &lines, workers, batch_size);
        prop_assert_eq!(pooled, expected);
    }
}

proptest! {
    #[test]
    fn merge_is_commutative(a in usage_aggregate(), b in usage_aggregate()) {
        prop_assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_is_associative(a in usage_aggregate(), b in usage_aggregate(), c in usage_aggregate()) {
        prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn default_is_merge_identity(a in usage_aggregate()) {
        prop_assert_eq!(UsageAggregate::default().merge(&a), a.clone());
        prop_assert_eq!(a.merge(&UsageAggregate::default()), a);
    }
}
