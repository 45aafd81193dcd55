//! Inspection photo assignment (insp-ai) - Main entry point
//!
//! Loads a directory of site photos and a notes file, runs the assignment
//! pipeline, and writes the result (assignments, photo names, diagnostics)
//! as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use insp_ai::intake::{load_photos, split_notes};
use insp_ai::pipeline::orchestrator::low_confidence_notes;
use insp_ai::{build_classifier, Orchestrator};
use insp_common::config::{load_config, write_toml_config, TomlConfig};

/// Command-line arguments for insp-ai
#[derive(Parser, Debug)]
#[command(name = "insp-ai")]
#[command(about = "Assign site inspection photos to observation notes")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the assignment pipeline
    Run {
        /// Directory containing the photos (jpg, png, webp, heic)
        #[arg(long)]
        photos: PathBuf,

        /// Text file containing the observation notes
        #[arg(long)]
        notes: PathBuf,

        /// Config file (falls back to INSP_CONFIG, then the user config dir)
        #[arg(short, long, env = "INSP_CONFIG")]
        config: Option<PathBuf>,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default config file
    InitConfig {
        /// Target path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            photos,
            notes,
            config,
            output,
        } => {
            let config = load_config(config.as_deref()).context("Failed to load configuration")?;
            init_tracing(&config);
            run(&config, photos, notes, output).await
        }
        Command::InitConfig { path, force } => {
            init_tracing(&TomlConfig::default());
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_toml_config(&TomlConfig::default(), &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

/// RUST_LOG wins over the configured level
fn init_tracing(config: &TomlConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(
    config: &TomlConfig,
    photo_dir: PathBuf,
    notes_path: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let photos = load_photos(&photo_dir).context("Failed to load photos")?;
    let text = std::fs::read_to_string(&notes_path)
        .with_context(|| format!("Failed to read notes from {}", notes_path.display()))?;
    let notes = split_notes(&text);

    info!(photos = photos.len(), notes = notes.len(), "Inputs loaded");
    if notes.is_empty() {
        warn!("No observation notes found in {}", notes_path.display());
    }

    let classifier = build_classifier(config).context("Failed to initialize classifier")?;
    let orchestrator = Orchestrator::new(classifier, config);
    let result = orchestrator.orchestrate(photos, notes).await;

    for (note_id, confidence) in low_confidence_notes(&result, config.matching.low_confidence_threshold) {
        warn!(note_id, confidence, "Low-confidence assignment, review recommended");
    }

    let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Result written to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
