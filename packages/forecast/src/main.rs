#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for training, evaluating and querying ARIMA models.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crime_atlas_forecast::{
    DEFAULT_MODEL_NAME, ModelStore, aggregate_extract, evaluate_holdout,
};
use crime_atlas_forecast_models::{ArimaOrder, Frequency};

#[derive(Parser)]
#[command(name = "crime_atlas_forecast", about = "Crime count forecasting tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model on an extract and save it
    Train {
        /// Path of the extract CSV
        #[arg(long)]
        extract: PathBuf,
        /// Resampling frequency (e.g. `D`, `W`, `ME`)
        #[arg(long, default_value = "ME")]
        freq: Frequency,
        /// ARIMA order as `p,d,q`
        #[arg(long, value_delimiter = ',', num_args = 3, default_value = "5,1,1")]
        order: Vec<i64>,
        /// Directory models are saved to
        #[arg(long, default_value = "data/models")]
        model_dir: PathBuf,
        /// Model name
        #[arg(long, default_value = DEFAULT_MODEL_NAME)]
        name: String,
    },
    /// Fit on all but the last periods of an extract and score the forecast
    Evaluate {
        /// Path of the extract CSV
        #[arg(long)]
        extract: PathBuf,
        /// Resampling frequency
        #[arg(long, default_value = "ME")]
        freq: Frequency,
        /// ARIMA order as `p,d,q`
        #[arg(long, value_delimiter = ',', num_args = 3, default_value = "5,1,1")]
        order: Vec<i64>,
        /// Number of trailing periods held out
        #[arg(long, default_value = "12")]
        holdout: usize,
    },
    /// Forecast with a saved model
    Predict {
        /// Directory models are loaded from
        #[arg(long, default_value = "data/models")]
        model_dir: PathBuf,
        /// Model name
        #[arg(long, default_value = DEFAULT_MODEL_NAME)]
        name: String,
        /// Number of periods to forecast
        #[arg(long, default_value = "6")]
        steps: usize,
        /// Confidence level in percent
        #[arg(long, default_value = "95")]
        confidence: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            extract,
            freq,
            order,
            model_dir,
            name,
        } => {
            let order = ArimaOrder::try_from_slice(&order)?;
            let series = aggregate_extract(&extract, freq)?;
            let model = crime_atlas_forecast::ArimaModel::fit(&series, order)?;
            let path = ModelStore::new(model_dir).save(&name, &model)?;

            println!("{}", model.summary());
            println!("Saved to {}", path.display());
        }
        Commands::Evaluate {
            extract,
            freq,
            order,
            holdout,
        } => {
            let order = ArimaOrder::try_from_slice(&order)?;
            let series = aggregate_extract(&extract, freq)?;
            let evaluation = evaluate_holdout(&series, order, holdout, 0.05)?;

            println!("{}", evaluation.model.summary());
            match evaluation.rmse {
                Some(rmse) => {
                    for (point, actual) in evaluation.forecast.iter().zip(&evaluation.actual) {
                        println!(
                            "{}  actual {actual:>8.1}  forecast {:>8.1}  [{:.1}, {:.1}]",
                            point.timestamp, point.value, point.lower_ci, point.upper_ci
                        );
                    }
                    println!("RMSE: {rmse:.3}");
                }
                None => println!(
                    "Series has {} periods, too few to hold out {holdout}; no score",
                    series.len()
                ),
            }
        }
        Commands::Predict {
            model_dir,
            name,
            steps,
            confidence,
        } => {
            if !(confidence > 0.0 && confidence < 100.0) {
                return Err(format!("confidence must be in (0, 100), got {confidence}").into());
            }
            let model = ModelStore::new(model_dir).load(&name)?;
            let forecast = model.forecast(steps, 1.0 - confidence / 100.0)?;
            println!("{}", serde_json::to_string_pretty(&forecast)?);
        }
    }

    Ok(())
}
