pub mod aggregate;
pub mod census;
pub mod config;
pub mod directory;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod lookup;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod storage;

pub use config::AppConfig;
pub use engine::{ReportEngine, RunSummary, VolumeOutcome, VolumeSummary};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
