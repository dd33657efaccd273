//! # mmrag CLI
//!
//! The `mmrag` binary ingests text, image and audio files into per-modality
//! vector collections and answers single-modality similarity queries.
//!
//! ## Usage
//!
//! ```bash
//! mmrag --config ./config/mmrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mmrag init` | Create the store and the three collections |
//! | `mmrag ingest <PATH>...` | Chunk, embed and store files and directories |
//! | `mmrag query --text "..."` | Query one modality (`--text`, `--image` or `--audio`) |
//! | `mmrag stats` | Per-collection record counts |
//! | `mmrag reset` | Drop all collections and audio chunk files |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a folder of notes, photos and recordings
//! mmrag ingest ./data/raw
//!
//! # Find the passage closest to a question
//! mmrag query --text "when was the bridge built" --top-k 3
//!
//! # Find similar images, as JSON
//! mmrag query --image ./cat.png --json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use mmrag::config::Config;
use mmrag::progress::ProgressMode;
use mmrag::services::Services;
use mmrag::{ingest_cmd, logging, query, reset, stats};

/// mmrag: a local-first multimodal ingestion and retrieval pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mmrag.example.toml` for a full example. A missing
/// file means defaults.
#[derive(Parser)]
#[command(
    name = "mmrag",
    about = "mmrag: multimodal (text, image, audio) ingestion and retrieval",
    version,
    long_about = "mmrag chunks text, image and audio files, embeds each chunk with a \
    modality-specific model, stores the vectors in per-modality collections, and answers \
    similarity queries within one modality at a time."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mmrag.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and the text, image and audio collections.
    ///
    /// Loads every configured embedder to learn its dimension. Idempotent.
    Init,

    /// Ingest files and directories.
    ///
    /// Directories are walked recursively. Files with unsupported
    /// extensions are skipped. Re-ingesting a file stores it again.
    Ingest {
        /// Files or directories to ingest.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Query one modality.
    ///
    /// Exactly one of `--text`, `--image`, `--audio` must be given.
    Query {
        /// Query text.
        #[arg(long, group = "input")]
        text: Option<String>,

        /// Path to a query image.
        #[arg(long, group = "input")]
        image: Option<String>,

        /// Path to a query audio clip.
        #[arg(long, group = "input")]
        audio: Option<String>,

        /// Maximum number of results (at least 1). Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<NonZeroUsize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show per-collection record counts.
    Stats,

    /// Drop every collection.
    Reset {
        /// Keep the materialized audio chunk files on disk.
        #[arg(long)]
        keep_artifacts: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Config::load_or_default(&cli.config)?;
    let _log_guard = logging::init(&cfg.logging)?;

    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            Services::build(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { paths } => {
            ingest_cmd::run_ingest(&cfg, &paths, progress).await?;
        }
        Commands::Query {
            text,
            image,
            audio,
            top_k,
            json,
        } => {
            query::run_query(
                &cfg,
                text.as_deref(),
                image.as_deref(),
                audio.as_deref(),
                top_k.map(NonZeroUsize::get),
                json,
            )
            .await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Reset { keep_artifacts } => {
            reset::run_reset(&cfg, keep_artifacts).await?;
        }
    }

    Ok(())
}
