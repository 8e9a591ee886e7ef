use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Lookup table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("No census file found for volume {volume} within {max_days_ago} days")]
    CensusNotFound { volume: u32, max_days_ago: u32 },

    #[error("Worker {worker} for volume {volume} disconnected before finishing")]
    WorkerLost { volume: u32, worker: usize },

    #[error("{0}")]
    Other(String),
}
