//! # FAQ Harvester CLI (`faqh`)
//!
//! The `faqh` binary runs the extraction loop, the vectorization pass,
//! similarity search and the JSON API.
//!
//! ## Usage
//!
//! ```bash
//! faqh --config ./config/faqh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `faqh extract` | Run exactly one extraction tick |
//! | `faqh run` | Tick now, then every `schedule.interval_secs` until Ctrl-C |
//! | `faqh vectorize` | Push not-yet-vectorized FAQ records to the index |
//! | `faqh search "<query>"` | Similarity search over the index |
//! | `faqh faqs` | List stored FAQ records |
//! | `faqh status` | Counts of stored records and ledgers |
//! | `faqh serve` | Start the JSON HTTP API |
//!
//! ## Environment
//!
//! Credentials are never read from the config file:
//! `GRAPH_ACCESS_TOKEN` (mail), `GEMINI_API_KEY` (validator),
//! `PINECONE_API_KEY` (Pinecone index), `OPENAI_API_KEY` (local index
//! embeddings). Log verbosity follows `RUST_LOG`, or `--verbose`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use faq_harvester::{config, pipeline::Extractor, search, server, stats, vectorize};

/// FAQ Harvester: mines a support mailbox for reusable question/answer
/// pairs and makes them searchable.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/faqh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "faqh",
    about = "FAQ Harvester: turn a support mailbox into a searchable FAQ knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/faqh.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run exactly one extraction tick and print its summary.
    Extract,

    /// Run the extraction loop on `schedule.interval_secs`.
    ///
    /// The first tick runs immediately. Ticks never overlap; a failed tick
    /// is logged and the loop continues. Stops on Ctrl-C.
    Run,

    /// Embed and upsert FAQ records not yet in the vector index.
    Vectorize {
        /// Only report how many records are pending.
        #[arg(long)]
        dry_run: bool,
    },

    /// Similarity search over the vector index.
    Search {
        /// Free-text query.
        query: String,

        /// Number of results (defaults to `vector.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// List stored FAQ records, newest first.
    Faqs {
        /// Maximum number of records to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show counts of stored records and both ledgers.
    Status,

    /// Start the JSON HTTP API on `server.bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Extract => {
            let mut extractor = Extractor::from_config(&cfg).await?;
            let summary = extractor.run_tick().await?;
            summary.print();
        }
        Commands::Run => {
            let mut extractor = Extractor::from_config(&cfg).await?;
            extractor.run_scheduled(cfg.schedule.interval()).await;
        }
        Commands::Vectorize { dry_run } => {
            vectorize::run_vectorize(&cfg, dry_run).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
        Commands::Faqs { limit } => {
            stats::run_list_faqs(&cfg, limit)?;
        }
        Commands::Status => {
            stats::run_status(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
