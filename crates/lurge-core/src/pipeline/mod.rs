//! Controller/worker pipeline for one census pass.
//!
//! Hub and spoke: a controller owns the census stream and a fixed pool of
//! workers. Workers pull batches by announcing readiness, accumulate into a
//! private map, and hand the map back once told the stream is finished.
//! Workers never talk to each other.

pub mod controller;
pub mod worker;

use crate::aggregate::{AggregateMap, AggregateSet, FiletypeClassifier, UsageAggregate};
use crate::census::CensusRecord;
use crate::partition::Partitioner;
use std::ops::AddAssign;

pub use controller::VolumeController;
pub use worker::{WorkerHandle, WorkerPool};

/// Controller to worker.
#[derive(Debug)]
pub enum ControllerMessage {
    Batch(Vec<String>),
    Done,
}

/// Worker to controller.
#[derive(Debug)]
pub enum WorkerMessage {
    Ready,
    Finished(PartialResult),
}

/// What one worker accumulated over a pass.
#[derive(Debug, Default)]
pub struct PartialResult {
    pub worker_id: usize,
    pub aggregates: AggregateMap,
    pub stats: PassStats,
}

/// Line counters kept for diagnostics; none of these are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub lines: u64,
    pub malformed: u64,
    /// Decoded records under no tracked base directory.
    pub unmatched: u64,
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        self.lines += rhs.lines;
        self.malformed += rhs.malformed;
        self.unmatched += rhs.unmatched;
    }
}

/// Read-only snapshot shared by every worker of a pass.
#[derive(Debug)]
pub struct PassContext {
    pub volume: u32,
    pub partitioner: Partitioner,
    pub classifier: FiletypeClassifier,
    /// Upper bound for modification times, fixed at pass start.
    pub now: i64,
}

impl PassContext {
    /// Decode, partition and accumulate one line into `map`.
    pub fn accumulate_line(&self, line: &str, map: &mut AggregateMap, stats: &mut PassStats) {
        stats.lines += 1;
        let record = match CensusRecord::decode(line) {
            Ok(record) => record,
            Err(_) => {
                stats.malformed += 1;
                return;
            }
        };

        let partition = self.partitioner.partition(&record);
        if !partition.matched_base {
            stats.unmatched += 1;
        }
        for key in partition.keys {
            map.entry(key)
                .or_insert_with(UsageAggregate::default)
                .accumulate(&record, self.now, &self.classifier);
        }
    }

    /// Single-threaded accumulation over `lines`, the reference the pooled
    /// pass must agree with.
    pub fn accumulate_all<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> (AggregateSet, PassStats) {
        let mut map = AggregateMap::new();
        let mut stats = PassStats::default();
        for line in lines {
            self.accumulate_line(line, &mut map, &mut stats);
        }
        (std::iter::once(map).collect(), stats)
    }
}

/// Fold worker results into the canonical set.
pub fn merge_partials(partials: Vec<PartialResult>) -> (AggregateSet, PassStats) {
    let mut stats = PassStats::default();
    let mut set = AggregateSet::new();
    for partial in partials {
        stats += partial.stats;
        set.absorb(partial.aggregates);
    }
    (set, stats)
}
