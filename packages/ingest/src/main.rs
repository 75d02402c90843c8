#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for building the master table and filtered extracts.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use crime_atlas_incident_models::{ExtractKey, OffenseFilter};
use crime_atlas_ingest::{ExtractCache, YearWindow, build_master};

#[derive(Parser)]
#[command(name = "crime_atlas_ingest", about = "Crime incident ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the master table from yearly `Crime_Incidents_in_{year}.json` files
    BuildMaster {
        /// Directory holding the yearly files
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,
        /// Output path of the master CSV
        #[arg(long, default_value = "data/processed/master_crime_data_2014-2024.csv")]
        output: PathBuf,
        /// First yearly file to load
        #[arg(long, default_value = "2014")]
        load_start: i32,
        /// Last yearly file to load
        #[arg(long, default_value = "2025")]
        load_end: i32,
        /// Earliest incident year kept in the master table
        #[arg(long, default_value = "2014")]
        min_year: i32,
        /// Latest incident year kept in the master table
        #[arg(long, default_value = "2024")]
        max_year: i32,
    },
    /// Generate (or reuse) the filtered extract for a year range and offense set
    Filter {
        /// Path of the master CSV
        #[arg(long, default_value = "data/processed/master_crime_data_2014-2024.csv")]
        master: PathBuf,
        /// Directory for generated extracts
        #[arg(long, default_value = "data/processed/extracts")]
        extract_dir: PathBuf,
        /// First year included
        #[arg(long)]
        start_year: i32,
        /// Last year included
        #[arg(long)]
        end_year: i32,
        /// Comma-separated offenses (omit for all offenses)
        #[arg(long, value_delimiter = ',')]
        offenses: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildMaster {
            raw_dir,
            output,
            load_start,
            load_end,
            min_year,
            max_year,
        } => {
            let start = Instant::now();
            let window = YearWindow { min_year, max_year };
            let written = build_master(&raw_dir, &output, load_start, load_end, window)?;
            log::info!(
                "Master table build complete: {written} records in {:.1}s",
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Filter {
            master,
            extract_dir,
            start_year,
            end_year,
            offenses,
        } => {
            let filter = OffenseFilter::from_request(offenses.into_iter().map(Some));
            let key = ExtractKey::new(start_year, end_year, filter)?;
            let cache = ExtractCache::new(master, extract_dir);
            let extract = cache.prepare(&key)?;
            println!(
                "{} ({} records{})",
                extract.path.display(),
                extract.record_count,
                if extract.generated { "" } else { ", cached" }
            );
        }
    }

    Ok(())
}
