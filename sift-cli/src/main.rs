use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sift::config::{Config, LoggingConfig};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(about = "Sift CLI - run aggregations over JSONL document dumps")]
#[command(version)]
struct Cli {
    /// Config file (TOML); created with defaults when missing
    #[arg(long, global = true, env = "SIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: pretty or json (overrides the config)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run aggregations over a JSONL file and print the results as JSON
    Run {
        /// Aggregation request (.json, .yaml or .yml)
        #[arg(short, long)]
        request: PathBuf,

        /// Schema mapping document fields to types (YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Documents, one JSON object per line
        #[arg(short, long)]
        docs: PathBuf,

        /// Precomputed background statistics for significant terms
        #[arg(short, long)]
        background: Option<PathBuf>,
    },

    /// Compute whole-corpus term statistics for a keyword field
    Background {
        /// Schema mapping document fields to types (YAML)
        #[arg(short, long)]
        schema: PathBuf,

        /// Documents, one JSON object per line
        #[arg(short, long)]
        docs: PathBuf,

        /// Keyword field to gather
        #[arg(short, long)]
        field: String,
    },
}

/// Stderr, or the configured log file opened for append.
fn log_writer(logging: &LoggingConfig) -> Result<BoxMakeWriter> {
    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Ok(BoxMakeWriter::new(Arc::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

fn init_logging(logging: &LoggingConfig, format_override: Option<&str>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    let writer = log_writer(logging)?;

    match format_override.unwrap_or(&logging.format) {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        _ => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(logging.file.is_none())
                    .with_writer(writer),
            )
            .init(),
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load_or_create(path).with_context(|| format!("Failed to load config {:?}", path))
        }
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&config.logging, cli.log_format.as_deref())?;

    match cli.command {
        Commands::Run {
            request,
            schema,
            docs,
            background,
        } => {
            tracing::debug!("Running {:?} over {:?}", request, docs);
            let results = commands::run_aggregations(
                &request,
                &schema,
                &docs,
                background.as_deref(),
                &config.aggregations,
            )?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Background { schema, docs, field } => {
            let stats = commands::run_background(&schema, &docs, &field)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
