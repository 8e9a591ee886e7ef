use crate::aggregate::{FiletypeClassifier, ReportKind};
use crate::census::{open_census, CensusDirectory, CensusFile, CensusLines, CensusLocator};
use crate::config::AppConfig;
use crate::directory::{PathRemapper, PseudoGroups};
use crate::enrich::{Enricher, ReportSet};
use crate::error::Error;
use crate::lookup::{HistoricalUsage, IdentityResolver, IdentityTable, QuotaTable};
use crate::partition::{BaseDirectoryTable, Partitioner};
use crate::pipeline::{merge_partials, PassContext, PassStats, VolumeController, WorkerPool};
use crate::progress::ProgressReporter;
use crate::storage::Database;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct ReportEngine {
    config: AppConfig,
    db_path: String,
    identity: Option<Arc<dyn IdentityResolver>>,
    locator: Option<Arc<dyn CensusLocator>>,
    today: Option<NaiveDate>,
    now: Option<i64>,
}

/// What happened to one volume during a run.
#[derive(Debug)]
pub enum VolumeOutcome {
    Reported {
        census: CensusFile,
        stats: PassStats,
        rows: BTreeMap<ReportKind, usize>,
        duration: Duration,
    },
    /// Every requested report for this census date was already stored.
    Skipped { census: CensusFile },
    Failed { error: Error },
}

#[derive(Debug)]
pub struct VolumeSummary {
    pub volume: u32,
    pub outcome: VolumeOutcome,
}

#[derive(Debug)]
pub struct RunSummary {
    pub volumes: Vec<VolumeSummary>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn reported(&self) -> usize {
        self.count(|o| matches!(o, VolumeOutcome::Reported { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, VolumeOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, VolumeOutcome::Failed { .. }))
    }

    pub fn outcome(&self, volume: u32) -> Option<&VolumeOutcome> {
        self.volumes.iter().find(|v| v.volume == volume).map(|v| &v.outcome)
    }

    fn count(&self, pred: impl Fn(&VolumeOutcome) -> bool) -> usize {
        self.volumes.iter().filter(|v| pred(&v.outcome)).count()
    }
}

/// Read-only state shared by every volume thread of a run.
struct RunInputs<'a> {
    partitioner: Partitioner,
    classifier: FiletypeClassifier,
    remapper: PathRemapper,
    pseudo_groups: PseudoGroups,
    identity: &'a dyn IdentityResolver,
    history: HistoricalUsage,
    locator: &'a dyn CensusLocator,
    db: Mutex<Database>,
    today: NaiveDate,
    now: i64,
}

/// Result of the threaded part of a volume, before persistence.
enum VolumePass {
    Reported {
        census: CensusFile,
        stats: PassStats,
        reports: ReportSet,
        started: Instant,
    },
    Skipped(CensusFile),
}

enum Preparation {
    Skip(CensusFile),
    Ready {
        census: CensusFile,
        quotas: QuotaTable,
        reader: Box<dyn BufRead + Send>,
    },
}

impl ReportEngine {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.database_path.clone();
        Self {
            config,
            db_path,
            identity: None,
            locator: None,
            today: None,
            now: None,
        }
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.db_path = path.to_string();
        self
    }

    /// Use `identity` instead of the configured identity tables.
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Use `locator` instead of searching the configured census directory.
    pub fn with_locator(mut self, locator: Arc<dyn CensusLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Fix the clamp applied to future modification times.
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    /// Produce and persist reports for each volume:
    /// 1. Load the base directory table, identities and usage history
    /// 2. One thread per volume: locate its census, stream it through a
    ///    worker pool, merge and enrich
    /// 3. Persist each successful volume's snapshots
    ///
    /// Setup failures abort the run. A failure within one volume is recorded
    /// in the summary and does not affect the others.
    pub fn run(
        &self,
        volumes: &[u32],
        start_days_ago: u32,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary, Error> {
        let started = Instant::now();
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let now = self.now.unwrap_or_else(|| Utc::now().timestamp());

        info!("Loading lookup tables...");
        let base_directories = BaseDirectoryTable::load(&self.config.base_directories_path)?;
        if base_directories.is_empty() {
            warn!("No base directories loaded; group and directory reports will be empty");
        }

        let identity: Arc<dyn IdentityResolver> = match &self.identity {
            Some(identity) => Arc::clone(identity),
            None => Arc::new(IdentityTable::load(
                self.config.identity_groups_path.as_deref(),
                self.config.identity_users_path.as_deref(),
            )?),
        };
        let locator: Arc<dyn CensusLocator> = match &self.locator {
            Some(locator) => Arc::clone(locator),
            None => Arc::new(
                CensusDirectory::new(&self.config.census_dir, self.config.max_days_ago).with_today(today),
            ),
        };

        let db = Database::open(&self.db_path)?;
        let history = db.load_historical_usage()?;

        let inputs = RunInputs {
            partitioner: Partitioner::new(
                base_directories,
                self.config.deep_nest_dirs.clone(),
                self.config.report_kinds.clone(),
            ),
            classifier: FiletypeClassifier::new(&self.config.filetypes)?,
            remapper: PathRemapper::new(&self.config.path_remaps)?,
            pseudo_groups: PseudoGroups::new(self.config.pseudo_groups.clone()),
            identity: identity.as_ref(),
            history,
            locator: locator.as_ref(),
            db: Mutex::new(db),
            today,
            now,
        };

        info!("Processing volumes: {:?}", volumes);
        let passes: Vec<(u32, Result<VolumePass, Error>)> = thread::scope(|scope| {
            let inputs = &inputs;
            let handles: Vec<_> = volumes
                .iter()
                .map(|&volume| {
                    let handle = thread::Builder::new()
                        .name(format!("lurge-v{}", volume))
                        .spawn_scoped(scope, move || self.process_volume(volume, start_days_ago, inputs, progress));
                    (volume, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(volume, handle)| {
                    let result = match handle {
                        Ok(handle) => handle
                            .join()
                            .unwrap_or_else(|_| Err(Error::Other(format!("volume {} thread panicked", volume)))),
                        Err(e) => Err(Error::Io(e)),
                    };
                    (volume, result)
                })
                .collect()
        });

        info!("Writing to database...");
        let mut summaries = Vec::with_capacity(passes.len());
        for (volume, pass) in passes {
            let outcome = match pass {
                Ok(VolumePass::Skipped(census)) => {
                    progress.on_volume_skipped(volume, "reports already stored for this census date");
                    VolumeOutcome::Skipped { census }
                }
                Ok(VolumePass::Reported {
                    census,
                    stats,
                    reports,
                    started,
                }) => match self.persist(&inputs.db, volume, &census, &reports, progress) {
                    Ok(rows) => VolumeOutcome::Reported {
                        census,
                        stats,
                        rows,
                        duration: started.elapsed(),
                    },
                    Err(error) => VolumeOutcome::Failed { error },
                },
                Err(error) => VolumeOutcome::Failed { error },
            };

            if let VolumeOutcome::Failed { error } = &outcome {
                error!("scratch{}: {}", volume, error);
                progress.on_volume_failed(volume, &error.to_string());
            }
            summaries.push(VolumeSummary { volume, outcome });
        }

        let summary = RunSummary {
            volumes: summaries,
            duration: started.elapsed(),
        };
        info!(
            "Run finished in {:.2}s: {} reported, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.reported(),
            summary.skipped(),
            summary.failed()
        );
        Ok(summary)
    }

    fn process_volume(
        &self,
        volume: u32,
        start_days_ago: u32,
        inputs: &RunInputs<'_>,
        progress: &dyn ProgressReporter,
    ) -> Result<VolumePass, Error> {
        let started = Instant::now();
        let ctx = Arc::new(PassContext {
            volume,
            partitioner: inputs.partitioner.clone(),
            classifier: inputs.classifier.clone(),
            now: inputs.now,
        });
        let pool = WorkerPool::spawn(ctx, self.config.workers_per_volume)?;
        let controller = VolumeController::new(pool, self.config.batch_size);

        let (census, quotas, reader) = match self.prepare(volume, start_days_ago, inputs) {
            Ok(Preparation::Ready {
                census,
                quotas,
                reader,
            }) => (census, quotas, reader),
            Ok(Preparation::Skip(census)) => {
                info!("scratch{}: reports for {} already stored, skipping", volume, census.record_date());
                controller.shutdown();
                return Ok(VolumePass::Skipped(census));
            }
            Err(e) => {
                controller.shutdown();
                return Err(e);
            }
        };

        progress.on_volume_start(volume, &census.path.to_string_lossy());
        let partials = controller.run(CensusLines::new(reader), progress)?;
        let (aggregates, stats) = merge_partials(partials);
        debug!(
            "scratch{}: {} lines, {} malformed, {} outside base directories, {} keys",
            volume,
            stats.lines,
            stats.malformed,
            stats.unmatched,
            aggregates.len()
        );

        let enricher = Enricher {
            identity: inputs.identity,
            quotas: &quotas,
            history: &inputs.history,
            remapper: &inputs.remapper,
            pseudo_groups: &inputs.pseudo_groups,
            warnings: &self.config.warnings,
            today: inputs.today,
        };
        let reports = enricher.enrich(&aggregates, &census);
        progress.on_volume_complete(volume, reports.len(), started.elapsed().as_secs_f64());

        Ok(VolumePass::Reported {
            census,
            stats,
            reports,
            started,
        })
    }

    /// Locate the census, check whether it is already reported, and open it.
    fn prepare(&self, volume: u32, start_days_ago: u32, inputs: &RunInputs<'_>) -> Result<Preparation, Error> {
        let census = inputs.locator.find_latest(volume, start_days_ago)?;
        let record_date = census.record_date();

        let all_stored = {
            let db = lock(&inputs.db)?;
            let mut all_stored = true;
            for &kind in &self.config.report_kinds {
                if !db.already_persisted(kind, volume, record_date)? {
                    all_stored = false;
                    break;
                }
            }
            all_stored
        };
        if all_stored {
            return Ok(Preparation::Skip(census));
        }

        let quotas = match &self.config.quota_dir {
            Some(dir) => QuotaTable::load(dir, volume)?,
            None => QuotaTable::new(),
        };
        let reader = open_census(&census.path)?;
        Ok(Preparation::Ready {
            census,
            quotas,
            reader,
        })
    }

    fn persist(
        &self,
        db: &Mutex<Database>,
        volume: u32,
        census: &CensusFile,
        reports: &ReportSet,
        progress: &dyn ProgressReporter,
    ) -> Result<BTreeMap<ReportKind, usize>, Error> {
        let db = lock(db)?;
        let record_date = census.record_date();
        let mut rows = BTreeMap::new();

        for &kind in &self.config.report_kinds {
            let write_start = Instant::now();
            let written = db.persist_snapshot(kind, volume, record_date, reports.for_kind(kind))?;
            progress.on_persist_complete(volume, kind, written, write_start.elapsed().as_secs_f64());
            rows.insert(kind, written);
        }
        Ok(rows)
    }
}

fn lock(db: &Mutex<Database>) -> Result<std::sync::MutexGuard<'_, Database>, Error> {
    db.lock()
        .map_err(|_| Error::Other("database lock poisoned".to_string()))
}
