use std::process;

use capsurr_cli::cli::{Cli, Commands};
use clap::Parser;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let config = cli.config.as_path();
    let result = match &cli.command {
        Commands::Sample {
            only_samples,
            index,
        } => commands::sample::handle(config, *only_samples, *index),
        Commands::Reference => commands::reference::handle(config),
        Commands::Materialize { index } => commands::materialize::handle(config, *index),
        Commands::Run { bundle } => commands::run::handle(config, bundle),
        Commands::Collect {
            single,
            error,
            threads,
        } => commands::collect::handle(config, single.as_deref(), *error, threads),
        Commands::Train {
            tuner,
            dataset,
            model,
        } => commands::train::handle(config, *tuner, dataset.as_ref(), model.as_ref()),
        Commands::Baselines { dataset, model } => {
            commands::baselines::handle(config, dataset.as_ref(), model.as_ref())
        }
        Commands::Predict {
            model,
            input,
            output,
        } => commands::predict::handle(config, model.as_ref(), input, output.as_ref()),
        Commands::Config => commands::config::handle(config),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
