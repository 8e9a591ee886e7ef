use super::models::*;
use super::sqlite::Database;
use crate::aggregate::{AggregateKey, ReportKind};
use crate::enrich::EnrichedReport;
use crate::lookup::HistoricalUsage;
use ahash::AHashMap;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Result};
use tracing::{debug, warn};

/// Report rows written per transaction.
pub const PERSIST_CHUNK_SIZE: usize = 500;

/// Values of the `stale` column.
pub const LIVE: i64 = 0;
pub const STALE: i64 = 1;
/// Written by a snapshot that has not finished yet.
pub const PENDING: i64 = 2;

/// Name a volume is stored under in the `volume` table.
pub fn volume_name(volume: u32) -> String {
    format!("scratch{}", volume)
}

fn report_table(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Group => "group_usage",
        ReportKind::Directory => "directory_usage",
        ReportKind::User => "user_usage",
    }
}

/// Dimension tables that map a unique name to an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Volume,
    Pi,
    UnixGroup,
    Filetype,
    CensusUser,
}

impl Dimension {
    fn table(self) -> &'static str {
        match self {
            Dimension::Volume => "volume",
            Dimension::Pi => "pi",
            Dimension::UnixGroup => "unix_group",
            Dimension::Filetype => "filetype",
            Dimension::CensusUser => "census_user",
        }
    }

    fn column(self) -> &'static str {
        match self {
            Dimension::Volume => "scratch_disk",
            Dimension::Pi => "pi_name",
            Dimension::UnixGroup => "group_name",
            Dimension::Filetype => "filetype_name",
            Dimension::CensusUser => "user_name",
        }
    }
}

/// Ids resolved during one snapshot write, so each name is looked up once.
#[derive(Default)]
struct DimensionCache {
    named: AHashMap<(Dimension, String), i64>,
    base_directories: AHashMap<String, i64>,
}

impl DimensionCache {
    fn named(&mut self, db: &Database, dimension: Dimension, name: &str) -> Result<i64> {
        if let Some(id) = self.named.get(&(dimension, name.to_string())) {
            return Ok(*id);
        }
        let id = db.get_or_insert_named(dimension, name)?;
        self.named.insert((dimension, name.to_string()), id);
        Ok(id)
    }

    fn optional(&mut self, db: &Database, dimension: Dimension, name: Option<&str>) -> Result<Option<i64>> {
        name.map(|name| self.named(db, dimension, name)).transpose()
    }

    fn base_directory(&mut self, db: &Database, path: &str, volume_id: i64) -> Result<i64> {
        if let Some(id) = self.base_directories.get(path) {
            return Ok(*id);
        }
        let id = db.get_or_insert_base_directory(path, volume_id)?;
        self.base_directories.insert(path.to_string(), id);
        Ok(id)
    }
}

impl Database {
    // ── Dimensions ───────────────────────────────────────────────

    pub fn find_named(&self, dimension: Dimension, name: &str) -> Result<Option<i64>> {
        match self.connection().query_row(
            &format!(
                "SELECT id FROM {} WHERE {} = ?1",
                dimension.table(),
                dimension.column()
            ),
            params![name],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Id of the row named `name`, inserting it first if needed. Matching is
    /// case-insensitive.
    pub fn get_or_insert_named(&self, dimension: Dimension, name: &str) -> Result<i64> {
        if let Some(id) = self.find_named(dimension, name)? {
            return Ok(id);
        }
        self.connection().execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?1)",
                dimension.table(),
                dimension.column()
            ),
            params![name],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_or_insert_base_directory(&self, path: &str, volume_id: i64) -> Result<i64> {
        let existing = self
            .connection()
            .query_row(
                "SELECT id FROM base_directory WHERE directory_path = ?1 AND volume_id = ?2",
                params![path, volume_id],
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => Ok(id),
            None => {
                self.connection().execute(
                    "INSERT INTO base_directory (directory_path, volume_id) VALUES (?1, ?2)",
                    params![path, volume_id],
                )?;
                Ok(self.connection().last_insert_rowid())
            }
        }
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Whether `kind` rows for this volume and census date are already stored.
    pub fn already_persisted(&self, kind: ReportKind, volume: u32, record_date: NaiveDate) -> Result<bool> {
        self.connection().query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} t JOIN volume v ON v.id = t.volume_id \
                 WHERE v.scratch_disk = ?1 AND t.record_date = ?2 AND t.stale = ?3)",
                report_table(kind)
            ),
            params![volume_name(volume), record_date, LIVE],
            |row| row.get(0),
        )
    }

    /// Replace the stored `kind` snapshot for a volume with `reports`.
    ///
    /// New rows are inserted as [`PENDING`] in chunks of
    /// [`PERSIST_CHUNK_SIZE`] per transaction. Only after the last chunk does
    /// one transaction flag the rows in scope stale, promote the pending rows
    /// to live and delete what is stale. A write that dies partway leaves the
    /// old snapshot live and the pending rows invisible, so
    /// [`Database::already_persisted`] stays false and the next run retries.
    ///
    /// Directory snapshots replace the whole volume; group and user snapshots
    /// replace only `record_date`, leaving earlier dates as history. Reports
    /// of other kinds are ignored.
    pub fn persist_snapshot(
        &self,
        kind: ReportKind,
        volume: u32,
        record_date: NaiveDate,
        reports: &[EnrichedReport],
    ) -> Result<usize> {
        let table = report_table(kind);
        let mut cache = DimensionCache::default();
        let volume_id = cache.named(self, Dimension::Volume, &volume_name(volume))?;

        // Left behind by an interrupted write
        let abandoned = self.connection().execute(
            &format!("DELETE FROM {} WHERE volume_id = ?1 AND stale = ?2", table),
            params![volume_id, PENDING],
        )?;
        if abandoned > 0 {
            warn!(
                "{} {}: discarded {} rows of an interrupted snapshot",
                volume_name(volume),
                table,
                abandoned
            );
        }

        let rows: Vec<&EnrichedReport> = reports.iter().filter(|r| r.key.kind() == kind).collect();
        let mut written = 0;
        for chunk in rows.chunks(PERSIST_CHUNK_SIZE) {
            let tx = self.connection().unchecked_transaction()?;
            for report in chunk {
                self.insert_report(&mut cache, volume_id, record_date, report)?;
                written += 1;
            }
            tx.commit()?;
        }

        let tx = self.connection().unchecked_transaction()?;
        let marked = match kind {
            ReportKind::Directory => tx.execute(
                &format!("UPDATE {} SET stale = ?2 WHERE volume_id = ?1 AND stale = ?3", table),
                params![volume_id, STALE, LIVE],
            )?,
            ReportKind::Group | ReportKind::User => tx.execute(
                &format!(
                    "UPDATE {} SET stale = ?3 WHERE volume_id = ?1 AND record_date = ?2 AND stale = ?4",
                    table
                ),
                params![volume_id, record_date, STALE, LIVE],
            )?,
        };
        tx.execute(
            &format!("UPDATE {} SET stale = ?2 WHERE volume_id = ?1 AND stale = ?3", table),
            params![volume_id, LIVE, PENDING],
        )?;
        // directory_filetype rows go with their directory via ON DELETE CASCADE
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE volume_id = ?1 AND stale = ?2", table),
            params![volume_id, STALE],
        )?;
        tx.commit()?;

        debug!(
            "{} {}: replaced {} rows ({} marked stale) with {} for {}",
            volume_name(volume),
            table,
            removed,
            marked,
            written,
            record_date
        );
        Ok(written)
    }

    fn insert_report(
        &self,
        cache: &mut DimensionCache,
        volume_id: i64,
        record_date: NaiveDate,
        report: &EnrichedReport,
    ) -> Result<()> {
        let usage = &report.usage;
        match &report.key {
            AggregateKey::Group { group_id, base_path } => {
                let path = report.display_path.as_deref().unwrap_or(base_path);
                let base_id = cache.base_directory(self, path, volume_id)?;
                let group_fk = cache.optional(self, Dimension::UnixGroup, report.group_name.as_deref())?;
                let pi_fk = cache.optional(self, Dimension::Pi, report.pi_name.as_deref())?;
                self.connection()
                    .prepare_cached(
                        "INSERT INTO group_usage \
                         (volume_id, base_directory_id, unix_group_id, pi_id, gid, used, quota, \
                          num_files, last_modified, warning_level, record_date, stale) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    )?
                    .execute(params![
                        volume_id,
                        base_id,
                        group_fk,
                        pi_fk,
                        report.gid.unwrap_or(*group_id),
                        usage.total_bytes as i64,
                        report.quota_bytes.map(|q| q as i64),
                        usage.file_count as i64,
                        report.relative_mtime_days,
                        report.warning_level,
                        record_date,
                        PENDING,
                    ])?;
            }
            AggregateKey::Directory {
                group_id,
                base_path,
                subdir,
            } => {
                let path = report.display_path.as_deref().unwrap_or(base_path);
                let base_id = cache.base_directory(self, path, volume_id)?;
                let group_fk = cache.optional(self, Dimension::UnixGroup, report.group_name.as_deref())?;
                let pi_fk = cache.optional(self, Dimension::Pi, report.pi_name.as_deref())?;
                self.connection()
                    .prepare_cached(
                        "INSERT INTO directory_usage \
                         (volume_id, base_directory_id, unix_group_id, pi_id, gid, subdirectory, \
                          size, quota, num_files, last_modified, record_date, stale) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    )?
                    .execute(params![
                        volume_id,
                        base_id,
                        group_fk,
                        pi_fk,
                        report.gid.unwrap_or(*group_id),
                        subdir,
                        usage.total_bytes as i64,
                        report.quota_bytes.map(|q| q as i64),
                        usage.file_count as i64,
                        report.relative_mtime_days,
                        record_date,
                        PENDING,
                    ])?;
                let directory_id = self.connection().last_insert_rowid();

                for (category, bytes) in &usage.category_bytes {
                    let filetype_id = cache.named(self, Dimension::Filetype, category)?;
                    self.connection()
                        .prepare_cached(
                            "INSERT INTO directory_filetype (directory_usage_id, filetype_id, size) \
                             VALUES (?1, ?2, ?3)",
                        )?
                        .execute(params![directory_id, filetype_id, *bytes as i64])?;
                }
            }
            AggregateKey::User { user_id } => {
                let user_fk = cache.optional(self, Dimension::CensusUser, report.user_name.as_deref())?;
                self.connection()
                    .prepare_cached(
                        "INSERT INTO user_usage \
                         (volume_id, census_user_id, uid, size, num_files, last_modified, record_date, stale) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    )?
                    .execute(params![
                        volume_id,
                        user_fk,
                        user_id,
                        usage.total_bytes as i64,
                        usage.file_count as i64,
                        report.relative_mtime_days,
                        record_date,
                        PENDING,
                    ])?;
            }
        }
        Ok(())
    }

    // ── History ──────────────────────────────────────────────────

    /// Past group usage keyed by group name and base directory, for the
    /// warning predictor. Rows without a resolved group are skipped.
    pub fn load_historical_usage(&self) -> Result<HistoricalUsage> {
        let mut stmt = self.connection().prepare(
            "SELECT ug.group_name, bd.directory_path, gu.record_date, gu.used \
             FROM group_usage gu \
             JOIN unix_group ug ON ug.id = gu.unix_group_id \
             JOIN base_directory bd ON bd.id = gu.base_directory_id \
             WHERE gu.stale = 0 \
             ORDER BY gu.record_date",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, NaiveDate>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut history = HistoricalUsage::new();
        for row in rows {
            let (group, path, date, used) = row?;
            history.record(&group, &path, date, used.max(0) as u64);
        }
        debug!("Loaded usage history for {} group directories", history.len());
        Ok(history)
    }

    // ── Report Queries ───────────────────────────────────────────

    /// Rows in the `kind` table, including any left pending by an
    /// interrupted write.
    pub fn count_rows(&self, kind: ReportKind) -> Result<i64> {
        self.connection().query_row(
            &format!("SELECT COUNT(*) FROM {}", report_table(kind)),
            [],
            |row| row.get(0),
        )
    }

    pub fn get_group_usage(&self, volume: u32) -> Result<Vec<GroupUsageRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT gu.id, v.scratch_disk, bd.directory_path, ug.group_name, p.pi_name, gu.gid, \
                    gu.used, gu.quota, gu.num_files, gu.last_modified, gu.warning_level, gu.record_date \
             FROM group_usage gu \
             JOIN volume v ON v.id = gu.volume_id \
             JOIN base_directory bd ON bd.id = gu.base_directory_id \
             LEFT JOIN unix_group ug ON ug.id = gu.unix_group_id \
             LEFT JOIN pi p ON p.id = gu.pi_id \
             WHERE v.scratch_disk = ?1 AND gu.stale = 0 \
             ORDER BY gu.record_date, bd.directory_path",
        )?;
        let rows = stmt
            .query_map(params![volume_name(volume)], |row| {
                Ok(GroupUsageRow {
                    id: row.get(0)?,
                    volume: row.get(1)?,
                    base_directory: row.get(2)?,
                    group_name: row.get(3)?,
                    pi_name: row.get(4)?,
                    gid: row.get(5)?,
                    used: row.get(6)?,
                    quota: row.get(7)?,
                    num_files: row.get(8)?,
                    last_modified: row.get(9)?,
                    warning_level: row.get(10)?,
                    record_date: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_directory_usage(&self, volume: u32) -> Result<Vec<DirectoryUsageRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT du.id, v.scratch_disk, bd.directory_path, du.subdirectory, ug.group_name, \
                    p.pi_name, du.gid, du.size, du.quota, du.num_files, du.last_modified, du.record_date \
             FROM directory_usage du \
             JOIN volume v ON v.id = du.volume_id \
             JOIN base_directory bd ON bd.id = du.base_directory_id \
             LEFT JOIN unix_group ug ON ug.id = du.unix_group_id \
             LEFT JOIN pi p ON p.id = du.pi_id \
             WHERE v.scratch_disk = ?1 AND du.stale = 0 \
             ORDER BY bd.directory_path, du.subdirectory",
        )?;
        let rows = stmt
            .query_map(params![volume_name(volume)], |row| {
                Ok(DirectoryUsageRow {
                    id: row.get(0)?,
                    volume: row.get(1)?,
                    base_directory: row.get(2)?,
                    subdirectory: row.get(3)?,
                    group_name: row.get(4)?,
                    pi_name: row.get(5)?,
                    gid: row.get(6)?,
                    size: row.get(7)?,
                    quota: row.get(8)?,
                    num_files: row.get(9)?,
                    last_modified: row.get(10)?,
                    record_date: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_directory_filetypes(&self, directory_usage_id: i64) -> Result<Vec<DirectoryFiletypeRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT df.directory_usage_id, f.filetype_name, df.size \
             FROM directory_filetype df \
             JOIN filetype f ON f.id = df.filetype_id \
             WHERE df.directory_usage_id = ?1 \
             ORDER BY f.filetype_name",
        )?;
        let rows = stmt
            .query_map(params![directory_usage_id], |row| {
                Ok(DirectoryFiletypeRow {
                    directory_usage_id: row.get(0)?,
                    filetype: row.get(1)?,
                    size: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_user_usage(&self, volume: u32) -> Result<Vec<UserUsageRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT uu.id, v.scratch_disk, cu.user_name, uu.uid, uu.size, uu.num_files, \
                    uu.last_modified, uu.record_date \
             FROM user_usage uu \
             JOIN volume v ON v.id = uu.volume_id \
             LEFT JOIN census_user cu ON cu.id = uu.census_user_id \
             WHERE v.scratch_disk = ?1 AND uu.stale = 0 \
             ORDER BY uu.record_date, uu.uid",
        )?;
        let rows = stmt
            .query_map(params![volume_name(volume)], |row| {
                Ok(UserUsageRow {
                    id: row.get(0)?,
                    volume: row.get(1)?,
                    user_name: row.get(2)?,
                    uid: row.get(3)?,
                    size: row.get(4)?,
                    num_files: row.get(5)?,
                    last_modified: row.get(6)?,
                    record_date: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }
}
