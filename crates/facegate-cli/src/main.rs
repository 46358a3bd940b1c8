use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use facegate_engine::Config;
use tracing_subscriber::EnvFilter;

mod models;
mod replay;

/// Attendance verification: face baseline, liveness challenge, QR dual check.
#[derive(Parser)]
#[command(name = "facegate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a recorded session through the engine.
    Replay {
        /// Trace file (JSON).
        trace: PathBuf,

        /// Submit the capture to the verification backend on success.
        #[arg(long, requires = "image")]
        submit: bool,

        /// JPEG to submit in place of the replayed frame.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Location sent with the submission (defaults to FACEGATE_ADDRESS).
        #[arg(long)]
        address: Option<String>,
    },
    /// Model asset integrity.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Subcommand)]
enum ModelsAction {
    /// Check that every weight file is present and matches checksums.toml.
    Verify {
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Hash the weight files and write checksums.toml.
    Pin {
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Replay {
            trace,
            submit,
            image,
            address,
        } => {
            let image = if submit { image } else { None };
            replay::run(&config, &trace, image.as_deref(), address.as_deref()).await
        }
        Command::Models { action } => match action {
            ModelsAction::Verify { model_dir } => {
                models::verify(&model_dir.unwrap_or(config.model_dir))
            }
            ModelsAction::Pin { model_dir } => models::pin(&model_dir.unwrap_or(config.model_dir)),
        },
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
