use chrono::NaiveDate;

/// A persisted group report row with its dimension names resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupUsageRow {
    pub id: i64,
    pub volume: String,
    pub base_directory: String,
    pub group_name: Option<String>,
    pub pi_name: Option<String>,
    pub gid: i64,
    pub used: i64,
    pub quota: Option<i64>,
    pub num_files: i64,
    pub last_modified: f64,
    pub warning_level: i64,
    pub record_date: NaiveDate,
}

/// A persisted directory report row.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUsageRow {
    pub id: i64,
    pub volume: String,
    pub base_directory: String,
    pub subdirectory: String,
    pub group_name: Option<String>,
    pub pi_name: Option<String>,
    pub gid: i64,
    pub size: i64,
    pub quota: Option<i64>,
    pub num_files: i64,
    pub last_modified: f64,
    pub record_date: NaiveDate,
}

/// Bytes of one file category under a directory report row.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryFiletypeRow {
    pub directory_usage_id: i64,
    pub filetype: String,
    pub size: i64,
}

/// A persisted user report row.
#[derive(Debug, Clone, PartialEq)]
pub struct UserUsageRow {
    pub id: i64,
    pub volume: String,
    pub user_name: Option<String>,
    pub uid: i64,
    pub size: i64,
    pub num_files: i64,
    pub last_modified: f64,
    pub record_date: NaiveDate,
}
