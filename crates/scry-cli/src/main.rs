mod commands;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scry_core::config::Config;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "scry",
    version,
    about = "Multi-signal code search over a local indexing core",
    long_about = "scry fuses keyword, vector, exact-name and call-graph signals from a local\n\
        indexing core, reranks the pool, and returns one ranked hit per file.\n\n\
        Quick start:\n  \
        scry index\n  \
        scry embed\n  \
        scry search \"where are retries configured\"\n  \
        scry outline src/app.py"
)]
struct Cli {
    /// Enable verbose logging (set log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file layered above .scry/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format: pretty or json (default: logging.format from config)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Indexing core endpoint (default: core.url from config)
    #[arg(long, global = true)]
    core_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project through the core
    ///
    /// Runs a full index (or an incremental one with --incremental) and embeds
    /// the symbols that need vectors when an embedding backend is configured.
    ///
    /// Examples:
    ///   scry index
    ///   scry index --incremental --path ../service
    Index {
        /// Path to the project root (default: current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Only re-index files changed since the last run
        #[arg(long)]
        incremental: bool,
    },
    /// Search the index
    ///
    /// Examples:
    ///   scry search "parse_config"
    ///   scry search "how are tokens refreshed" --lang python --limit 5
    ///   scry search "Handler" --path-filter src/api/ --json
    Search {
        /// Search query: an identifier, a path, or natural language
        query: String,

        /// Maximum number of results (default: search.default_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Filter by language
        #[arg(long)]
        lang: Option<String>,

        /// Only return hits under this project-relative path prefix
        #[arg(long)]
        path_filter: Option<String>,

        /// Return several hits per file instead of one representative each
        #[arg(long)]
        no_dedupe: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Embed every symbol (or chunk) that the core lists
    ///
    /// Examples:
    ///   scry embed
    ///   scry embed --chunks --timeout-secs 600
    Embed {
        /// Embed code chunks instead of symbols
        #[arg(long)]
        chunks: bool,

        /// Stop submitting batches after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Find symbols by exact name or qualified name
    Symbol {
        name: String,

        #[arg(long)]
        json: bool,
    },
    /// List the symbols defined in a file
    Outline {
        /// Project-relative file path
        path: String,

        #[arg(long)]
        json: bool,
    },
    /// Show callers, callees and type hierarchy of a symbol
    Context {
        symbol_id: String,

        /// Traversal depth (clamped to 1..=5)
        #[arg(long, default_value = "2")]
        depth: u32,

        /// Neighbours per node (clamped to 1..=200)
        #[arg(long, default_value = "20")]
        fanout: usize,

        #[arg(long)]
        json: bool,
    },
    /// Generate per-file summaries and store them in the core
    Summarize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let root = match &cli.command {
        Commands::Index { path, .. } => resolve_path(path.clone())?,
        _ => std::env::current_dir()?,
    };
    let mut config = Config::load_with_file(Some(&root), cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = &cli.core_url {
        config.core.url = url.clone();
    }

    init_logging(&config, cli.verbose, cli.log_format.as_deref());

    match cli.command {
        Commands::Index { incremental, .. } => {
            commands::index::run(&root, &config, incremental)?;
        }
        Commands::Search {
            query,
            limit,
            lang,
            path_filter,
            no_dedupe,
            json,
        } => {
            let request = commands::search::SearchRequest {
                query: &query,
                limit: limit.unwrap_or(config.search.default_limit),
                language: lang,
                path_prefix: path_filter,
                dedupe_by_file: config.search.dedupe_by_file && !no_dedupe,
                json,
            };
            commands::search::run(&root, &config, &request)?;
        }
        Commands::Embed {
            chunks,
            timeout_secs,
        } => {
            commands::embed::run(&root, &config, chunks, timeout_secs)?;
        }
        Commands::Symbol { name, json } => {
            commands::navigate::symbol(&root, &config, &name, json)?;
        }
        Commands::Outline { path, json } => {
            commands::navigate::outline(&root, &config, &path, json)?;
        }
        Commands::Context {
            symbol_id,
            depth,
            fanout,
            json,
        } => {
            commands::navigate::context(&root, &config, &symbol_id, depth, fanout, json)?;
        }
        Commands::Summarize => {
            commands::summarize::run(&root, &config)?;
        }
    }

    Ok(())
}

fn init_logging(config: &Config, verbose: bool, format_override: Option<&str>) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let format = format_override.unwrap_or(config.logging.format.as_str());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_path(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => Ok(std::env::current_dir()?),
    }
}

pub(crate) fn open_engine(root: &Path, config: &Config) -> anyhow::Result<scry_query::Engine> {
    scry_query::Engine::from_config(root, config)
        .with_context(|| format!("Failed to set up engine for {}", root.display()))
}
