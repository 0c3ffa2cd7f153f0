pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::GlobalOptions;
use rxalt_core::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "rxalt",
    about = "Drug alternative recommender CLI",
    long_about = "Recommend lower-cost drug alternatives, assess interaction risk, and train the scoring model.",
    after_help = "Examples:\n  rxalt recommend LIPITOR\n  rxalt recommend COUMADIN ASPIRIN\n  rxalt train --model model.json\n  rxalt config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an rxalt.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Drug dataset JSON file (overrides config)")]
    dataset: Option<PathBuf>,
    #[arg(long, global = true, help = "Model file to read and write (overrides config)")]
    model: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Recommend an alternative for one drug or a combination for two")]
    Recommend {
        #[arg(required = true, help = "Drug names as they appear in the dataset")]
        names: Vec<String>,
    },
    #[command(about = "Synthesize a training corpus, fit the model, and persist it")]
    Train,
    #[command(about = "Assess the interaction risk between two drugs")]
    Classify { first: String, second: String },
    #[command(about = "Summarize the dataset")]
    Stats,
    #[command(about = "List therapeutic classes with drug counts")]
    Classes,
    #[command(about = "List every drug in the dataset")]
    Drugs,
    #[command(about = "Break spend down by therapeutic class, state, and member age")]
    CostAnalysis,
    #[command(about = "Report dataset, model, and classifier readiness")]
    Health,
    #[command(about = "Add a drug record to the dataset and retrain")]
    AddDrug {
        #[arg(long, help = "Drug record as a JSON object")]
        record: String,
        #[arg(long, help = "Write the dataset without retraining the model")]
        skip_retrain: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config_path: cli.config,
        dataset_path: cli.dataset,
        model_path: cli.model,
    };

    if let Ok(config) = options.load_config() {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Recommend { names } => commands::recommend::run(&options, &names),
        Command::Train => commands::train::run(&options),
        Command::Classify { first, second } => commands::classify::run(&options, &first, &second),
        Command::Stats => commands::dataset::stats(&options),
        Command::Classes => commands::dataset::classes(&options),
        Command::Drugs => commands::dataset::drugs(&options),
        Command::CostAnalysis => commands::dataset::cost_analysis(&options),
        Command::Health => commands::health::run(&options),
        Command::AddDrug { record, skip_retrain } => {
            commands::add_drug::run(&options, &record, !skip_retrain)
        }
        Command::Config => commands::config::run(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON outcome.
fn init_logging(config: &AppConfig) {
    use rxalt_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
