use capsurr_core::TunerStrategy;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Capacity-expansion sampling and surrogate pipeline", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Study configuration file (TOML, or JSON/YAML by extension)
    #[arg(long, short = 'c', default_value = "study.toml", value_hint = ValueHint::FilePath)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Draw the sample design and materialize its bundles
    Sample {
        /// Only write the samples file
        #[arg(long)]
        only_samples: bool,
        /// Materialize a single sample (reuses the samples file when present)
        #[arg(long)]
        index: Option<usize>,
    },
    /// Build the reference bundle and its summary
    Reference,
    /// Materialize one sample from the saved design
    Materialize {
        /// Sample index
        #[arg(long)]
        index: usize,
    },
    /// Run the simulator on one bundle and append its row to the dataset
    Run {
        /// Bundle directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        bundle: PathBuf,
    },
    /// Collect simulated bundles into the dataset table
    Collect {
        /// Append a single bundle instead of rebuilding the dataset
        #[arg(long, value_hint = ValueHint::DirPath)]
        single: Option<PathBuf>,
        /// Error flag recorded for `--single`
        #[arg(long, default_value_t = 0, allow_negative_numbers = true, requires = "single")]
        error: i32,
        /// Worker threads ("auto" or a number)
        #[arg(long, default_value = "1")]
        threads: String,
    },
    /// Train the surrogate on the collected dataset
    Train {
        /// Hyperparameter search strategy (random, bayesian, hyperband)
        #[arg(long)]
        tuner: Option<TunerStrategy>,
        /// Dataset table; defaults to the configured one
        #[arg(long, value_hint = ValueHint::FilePath)]
        dataset: Option<PathBuf>,
        /// Model output path; defaults to the configured one
        #[arg(long, value_hint = ValueHint::FilePath)]
        model: Option<PathBuf>,
    },
    /// Train the fixed baseline architectures for comparison with the tuned model
    Baselines {
        /// Dataset table; defaults to the configured one
        #[arg(long, value_hint = ValueHint::FilePath)]
        dataset: Option<PathBuf>,
        /// Model path whose directory receives the results; defaults to the configured one
        #[arg(long, value_hint = ValueHint::FilePath)]
        model: Option<PathBuf>,
    },
    /// Predict outputs for the rows of a CSV file
    Predict {
        /// Trained model; defaults to the configured one
        #[arg(long, value_hint = ValueHint::FilePath)]
        model: Option<PathBuf>,
        /// CSV file with the feature columns
        #[arg(long, value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// Output CSV; defaults to `<input>-predictions.csv`
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn parses_collect_with_negative_error_flag() {
        let cli = Cli::try_parse_from([
            "capsurr-cli",
            "collect",
            "--single",
            "sims/sim-1_x",
            "--error",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Collect { single, error, .. } => {
                assert_eq!(single, Some(PathBuf::from("sims/sim-1_x")));
                assert_eq!(error, -1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_tuner_names() {
        let cli = Cli::try_parse_from(["capsurr-cli", "train", "--tuner", "hyperband"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Train {
                tuner: Some(TunerStrategy::Hyperband),
                ..
            }
        ));
        assert!(Cli::try_parse_from(["capsurr-cli", "train", "--tuner", "grid"]).is_err());
    }

    #[test]
    fn parses_baselines_dataset() {
        let cli =
            Cli::try_parse_from(["capsurr-cli", "baselines", "--dataset", "data.csv"]).unwrap();
        match cli.command {
            Commands::Baselines { dataset, model } => {
                assert_eq!(dataset, Some(PathBuf::from("data.csv")));
                assert_eq!(model, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn error_flag_requires_single() {
        assert!(Cli::try_parse_from(["capsurr-cli", "collect", "--error", "2"]).is_err());
    }
}
