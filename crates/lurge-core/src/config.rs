use crate::aggregate::filetype::default_filetype_rules;
use crate::aggregate::{FiletypeRule, ReportKind};
use crate::directory::{default_path_remaps, PathRemap, PseudoGroup};
use crate::enrich::WarningPolicy;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Volume numbers to report on, e.g. `[114, 115, 118]`. The CLI may
    /// override this list.
    #[serde(default)]
    pub volumes: Vec<u32>,
    #[serde(default = "default_census_dir")]
    pub census_dir: PathBuf,
    #[serde(default = "default_max_days_ago")]
    pub max_days_ago: u32,
    #[serde(default = "default_workers_per_volume")]
    pub workers_per_volume: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Directory for the daily log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_base_directories_path")]
    pub base_directories_path: PathBuf,
    #[serde(default)]
    pub identity_groups_path: Option<PathBuf>,
    #[serde(default)]
    pub identity_users_path: Option<PathBuf>,
    /// Directory of per-volume quota CSVs. No quotas when unset.
    #[serde(default)]
    pub quota_dir: Option<PathBuf>,
    #[serde(default = "default_report_kinds")]
    pub report_kinds: Vec<ReportKind>,
    #[serde(default = "default_deep_nest_dirs")]
    pub deep_nest_dirs: Vec<String>,
    #[serde(default = "default_filetype_rules")]
    pub filetypes: Vec<FiletypeRule>,
    #[serde(default = "default_path_remaps")]
    pub path_remaps: Vec<PathRemap>,
    #[serde(default)]
    pub pseudo_groups: Vec<PseudoGroup>,
    #[serde(default)]
    pub warnings: WarningPolicy,
}

fn default_census_dir() -> PathBuf {
    PathBuf::from("/lustre/scratch114/teams/hgi/lustre_reports/mpistat/data")
}

fn default_max_days_ago() -> u32 {
    10
}

fn default_workers_per_volume() -> usize {
    6
}

fn default_batch_size() -> usize {
    250
}

fn default_database_path() -> String {
    "lurge.db".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_base_directories_path() -> PathBuf {
    PathBuf::from("base_directories.tsv")
}

fn default_report_kinds() -> Vec<ReportKind> {
    ReportKind::ALL.to_vec()
}

fn default_deep_nest_dirs() -> Vec<String> {
    vec!["users".to_string(), "projects".to_string()]
}

impl AppConfig {
    /// Configuration with every default and the given volumes.
    pub fn with_volumes(volumes: Vec<u32>) -> Self {
        Self {
            volumes,
            census_dir: default_census_dir(),
            max_days_ago: default_max_days_ago(),
            workers_per_volume: default_workers_per_volume(),
            batch_size: default_batch_size(),
            database_path: default_database_path(),
            log_dir: default_log_dir(),
            base_directories_path: default_base_directories_path(),
            identity_groups_path: None,
            identity_users_path: None,
            quota_dir: None,
            report_kinds: default_report_kinds(),
            deep_nest_dirs: default_deep_nest_dirs(),
            filetypes: default_filetype_rules(),
            path_remaps: default_path_remaps(),
            pseudo_groups: Vec::new(),
            warnings: WarningPolicy::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix("LURGE")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("volumes")
        .with_list_parse_key("report_kinds")
        .with_list_parse_key("deep_nest_dirs")
}

/// Load `Config.toml` from the working directory (if present) overlaid with
/// `LURGE_*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Load a specific configuration file, without the environment overlay.
pub fn load_configuration_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
