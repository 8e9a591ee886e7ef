use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "lurge")]
#[command(about = "Storage usage reports from filesystem census files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Aggregate the latest census of each volume and store the reports
    Report {
        /// Volumes to report on; defaults to the configured list
        #[arg(short, long, num_args = 1..)]
        volumes: Vec<u32>,
        /// Ignore census files newer than this many days
        #[arg(short, long, default_value_t = 0)]
        start_days_ago: u32,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all report tables
    TruncateDb,
}
