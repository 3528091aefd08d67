#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `drought_risk` command-line tool.
//!
//! Each subcommand runs one pipeline stage against the configured state
//! directory; `run` chains them all. Log output goes through
//! [`drought_risk_cli_utils::init_logger`] so it never tears the progress
//! bars.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use drought_risk_cli_utils::TerminalProgress;
use drought_risk_pipeline::{
    PipelineConfig, aggregate_regions, annotate_boundaries, compute_trends, correct_coordinates,
    register_stations, run_all, score_regions,
};
use drought_risk_station_models::VariableKind;

#[derive(Parser)]
#[command(name = "drought_risk", about = "Drought risk scoring from hydrological station records")]
struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(long, global = true, default_value = "drought_risk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register stations from the listing and record headers
    Register {
        /// Variable to register (level, discharge, precipitation, sediment)
        #[arg(long)]
        variable: VariableKind,
    },
    /// Re-derive station locations with the correction transform
    Coordinates {
        #[arg(long)]
        variable: VariableKind,
    },
    /// Estimate decadal trends from record files
    Trends {
        #[arg(long)]
        variable: VariableKind,
    },
    /// Summarize station trends onto regions
    Aggregate,
    /// Compute composite risk scores for regions
    Score,
    /// Write the annotated region boundaries
    Annotate,
    /// Run every stage for every configured variable
    Run,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = drought_risk_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = PipelineConfig::load(&cli.config)?;
    let start = Instant::now();

    match cli.command {
        Commands::Register { variable } => {
            let summary =
                register_stations(&config, variable, &TerminalProgress::files_bar(&multi))?;
            log::info!(
                "{variable}: {} new, {} refreshed, {} without location",
                summary.added,
                summary.refreshed,
                summary.unlocated
            );
        }
        Commands::Coordinates { variable } => {
            let summary =
                correct_coordinates(&config, variable, &TerminalProgress::files_bar(&multi))?;
            log::info!(
                "{variable}: {} corrected, {} cleared, {} kept newer, {} unknown",
                summary.corrected,
                summary.cleared,
                summary.kept_newer,
                summary.unknown
            );
        }
        Commands::Trends { variable } => {
            compute_trends(&config, variable, &TerminalProgress::files_bar(&multi))?;
        }
        Commands::Aggregate => {
            aggregate_regions(&config, &TerminalProgress::files_bar(&multi))?;
        }
        Commands::Score => {
            let regions = score_regions(&config)?;
            println!("{:<8} {:<28} {:>6}  CATEGORY", "KEY", "NAME", "SCORE");
            println!("{}", "-".repeat(54));
            for region in &regions {
                if let Some(risk) = &region.risk {
                    println!(
                        "{:<8} {:<28} {:>6.3}  {}",
                        region.key, region.name, risk.score, risk.category
                    );
                }
            }
        }
        Commands::Annotate => {
            annotate_boundaries(&config)?;
        }
        Commands::Run => {
            let steps = TerminalProgress::stages_bar(&multi);
            let files = TerminalProgress::files_bar(&multi);
            run_all(&config, &steps, &files)?;
        }
    }

    log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_variable_kinds() {
        let cli = Cli::try_parse_from(["drought_risk", "trends", "--variable", "discharge"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Trends {
                variable: VariableKind::Discharge
            }
        ));
        assert_eq!(cli.config, PathBuf::from("drought_risk.toml"));

        let cli = Cli::try_parse_from([
            "drought_risk",
            "--config",
            "other.toml",
            "register",
            "--variable",
            "level",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Register {
                variable: VariableKind::Level
            }
        ));
        assert_eq!(cli.config, PathBuf::from("other.toml"));

        assert!(Cli::try_parse_from(["drought_risk", "trends", "--variable", "snow"]).is_err());
    }
}
