//! Zoomreel CLI: create, validate, inspect, and export edit documents.
//!
//! Usage:
//!   zoomreel init <PATH>        Write a default edit document
//!   zoomreel validate <PATH>    Validate an edit document
//!   zoomreel graph <PATH>       Print the compiled filter graph
//!   zoomreel export <PATH>      Export an edit to video
//!   zoomreel check              Check for ffmpeg and ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "zoomreel",
    about = "Trim, crop, frame, and zoom screen recordings",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default edit document
    Init {
        /// Path of the edit document to create
        path: PathBuf,

        /// Source video the edit applies to
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Source duration in seconds (sets the trim window)
        #[arg(long, default_value = "10.0")]
        duration: f64,
    },

    /// Validate an edit document
    Validate {
        /// Path to the edit document
        path: PathBuf,

        /// Also check the trim window against this source duration
        #[arg(long)]
        source_duration: Option<f64>,
    },

    /// Print the filter graph an edit compiles to
    Graph {
        /// Path to the edit document
        path: PathBuf,

        /// Source frame width
        #[arg(long, default_value = "1920")]
        source_width: u32,

        /// Source frame height
        #[arg(long, default_value = "1080")]
        source_height: u32,
    },

    /// Export an edit to video
    Export {
        /// Path to the edit document
        path: PathBuf,

        /// Source video (defaults to the document's source)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rendering backend: frames|filter-graph
        #[arg(long)]
        backend: Option<String>,

        /// Quality preset: low|medium|high
        #[arg(long)]
        quality: Option<String>,
    },

    /// Check for ffmpeg and ffprobe
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = zoomreel_common::config::AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    zoomreel_common::logging::init_logging(&logging);
    tracing::debug!(level = %logging.level, json = logging.json, "Logging initialized");
    config.export.validate()?;

    match cli.command {
        Commands::Init {
            path,
            source,
            duration,
        } => commands::init::run(path, source, duration, &config.export),
        Commands::Validate {
            path,
            source_duration,
        } => commands::validate::run(path, source_duration),
        Commands::Graph {
            path,
            source_width,
            source_height,
        } => commands::graph::run(path, source_width, source_height),
        Commands::Export {
            path,
            source,
            output,
            backend,
            quality,
        } => commands::export::run(path, source, output, backend, quality, config.export).await,
        Commands::Check => commands::check::run(&config.export),
    }
}
