//! SDC CLI
//!
//! Loads a questionnaire (and optionally a response), applies answers and
//! prints the resulting state, response or validation results as JSON.

mod commands;
mod logging;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use settings::Settings;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sdc")]
#[command(about = "Drive an SDC questionnaire from the command line")]
#[command(version)]
#[command(
    long_about = "Loads a FHIR Questionnaire, optionally with a QuestionnaireResponse, applies answers and prints JSON.\n\
\n\
Examples:\n  \
sdc state -q intake.json\n  \
sdc response -q intake.json -a 'age={\"valueInteger\":42}'\n  \
sdc validate -q intake.json -r draft.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); `SDC__*` environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Locale used to pick translations, e.g. `de-CH`
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Log JSON lines instead of human-readable output
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the questionnaire state after applying the inputs
    State {
        #[command(flatten)]
        input: commands::Input,

        /// Render in review mode
        #[arg(long)]
        review: bool,
    },
    /// Print the QuestionnaireResponse for submission
    Response {
        #[command(flatten)]
        input: commands::Input,
    },
    /// Print validation results; exits with 1 when any item is invalid
    Validate {
        #[command(flatten)]
        input: commands::Input,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.locale.is_some() {
        settings.engine.locale = cli.locale.clone();
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    logging::init_logging(&settings.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::State { input, review } => {
            let engine = commands::load(&input, settings.engine).await?;
            commands::print_state(engine, review).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Response { input } => {
            let engine = commands::load(&input, settings.engine).await?;
            commands::print_response(&engine)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { input } => {
            let engine = commands::load(&input, settings.engine).await?;
            let valid = commands::print_validation(&engine)?;
            Ok(if valid { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
    }
}
