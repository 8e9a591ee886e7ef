mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use lurge_core::{AppConfig, ReportEngine, RunSummary, VolumeOutcome};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = match lurge_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {}", "Error loading configuration:".red(), err);
            process::exit(1);
        }
    };

    let _guard = logging::init_logger(&config);

    let args = Cli::parse();

    match args.command {
        Some(Commands::Report {
            volumes,
            start_days_ago,
        }) => match run_report(&config, volumes, start_days_ago) {
            Ok(summary) if summary.failed() > 0 => process::exit(2),
            Ok(_) => {}
            Err(err) => {
                error!("Error: {}", err);
                process::exit(1);
            }
        },
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to delete EVERY stored report?",
                Some(false),
            ) {
                Ok(true) => match lurge_core::storage::Database::open(&config.database_path) {
                    Ok(db) => {
                        if let Err(e) = db.truncate_all() {
                            error!("Error truncating database: {}", e);
                        } else {
                            println!("All report tables truncated");
                        }
                    }
                    Err(e) => error!("Error opening database: {}", e),
                },
                _ => {
                    process::exit(0);
                }
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
        }
    }

    Ok(())
}

fn run_report(
    config: &AppConfig,
    volumes: Vec<u32>,
    start_days_ago: u32,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let volumes = if volumes.is_empty() {
        config.volumes.clone()
    } else {
        volumes
    };
    if volumes.is_empty() {
        return Err("no volumes given and none configured".into());
    }

    let engine = ReportEngine::new(config.clone());
    let reporter = CliReporter::new();
    let summary = engine.run(&volumes, start_days_ago, &reporter)?;

    println!();
    for volume in &summary.volumes {
        match &volume.outcome {
            VolumeOutcome::Reported {
                census,
                stats,
                rows,
                duration,
            } => {
                let written: usize = rows.values().sum();
                info!(
                    "scratch{}: {} lines from {}, {} rows for {} in {}",
                    volume.volume,
                    format!("{}", stats.lines).cyan(),
                    census.path.display(),
                    format!("{}", written).green(),
                    census.record_date(),
                    format!("{:.2}s", duration.as_secs_f64()).green(),
                );
                if stats.malformed > 0 {
                    warn!(
                        "scratch{}: {} malformed census lines skipped",
                        volume.volume,
                        format!("{}", stats.malformed).yellow()
                    );
                }
            }
            VolumeOutcome::Skipped { census } => {
                info!(
                    "scratch{}: {} already reported",
                    volume.volume,
                    census.record_date().to_string().yellow()
                );
            }
            VolumeOutcome::Failed { error } => {
                error!("scratch{}: {}", volume.volume, error.to_string().red());
            }
        }
    }
    info!(
        "{} reported, {} skipped, {} failed in {}",
        format!("{}", summary.reported()).green(),
        format!("{}", summary.skipped()).yellow(),
        format!("{}", summary.failed()).red(),
        format!("{:.2}s", summary.duration.as_secs_f64()).green(),
    );

    Ok(summary)
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
