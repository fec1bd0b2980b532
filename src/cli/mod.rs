//! CLI module for the PMP RAG engine
//!
//! Provides subcommands for running the engine and administering its cache:
//! - `serve`: run the engine with background maintenance until shutdown
//! - cache administration (`stats`, `health`, `entries`, `optimize`, ...)
//! - retrieval (`ingest`, `query`)

pub mod admin;
pub mod retrieval;
pub mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::domain::semantic_cache::CacheSettingsUpdate;
use crate::infrastructure::logging;
use crate::infrastructure::services::AdminResponse;
use crate::RagEngine;

/// PMP RAG Engine - semantic retrieval with a similarity-aware query cache
#[derive(Parser)]
#[command(name = "pmp-rag-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the engine with periodic cache maintenance until Ctrl+C or SIGTERM
    Serve,

    /// Show cache statistics
    Stats,

    /// Score cache health
    Health,

    /// List cache entries
    Entries(EntriesArgs),

    /// Show one cache entry
    Entry {
        /// Query hash of the entry
        hash: String,
    },

    /// Delete one cache entry
    Delete {
        /// Query hash of the entry
        hash: String,
    },

    /// Remove expired cache entries
    Cleanup,

    /// Evict the least recently used tenth of the cache
    Evict,

    /// Clean up, evict and compact the cache
    Optimize,

    /// Remove every cache entry
    Clear,

    /// Export cache entries to a JSON file
    Export(ExportArgs),

    /// Import cache entries from a JSON export
    Import(ImportArgs),

    /// Back up the cache and its query index into a directory
    Backup {
        /// Target directory
        dir: PathBuf,
    },

    /// Change runtime cache settings
    ConfigUpdate(ConfigUpdateArgs),

    /// Look a query up in the cache without retrieving
    Probe(ProbeArgs),

    /// Embed documents from a JSON file into the document index
    Ingest(IngestArgs),

    /// Retrieve context for a query
    Query(QueryArgs),
}

#[derive(Args)]
pub struct EntriesArgs {
    /// Case-insensitive substring of the query text
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    #[arg(long)]
    pub include_expired: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output file
    pub file: PathBuf,

    #[arg(long)]
    pub include_embeddings: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Export file to read
    pub file: PathBuf,

    /// Replace entries that already exist
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args)]
pub struct ConfigUpdateArgs {
    #[arg(long)]
    pub max_cache_size: Option<usize>,

    #[arg(long)]
    pub ttl_hours: Option<u32>,

    #[arg(long)]
    pub threshold: Option<f32>,
}

impl From<&ConfigUpdateArgs> for CacheSettingsUpdate {
    fn from(args: &ConfigUpdateArgs) -> Self {
        Self {
            max_cache_size: args.max_cache_size,
            default_ttl_hours: args.ttl_hours,
            similarity_threshold: args.threshold,
        }
    }
}

#[derive(Args)]
pub struct ProbeArgs {
    pub query: String,

    /// Override the stored similarity thresholds
    #[arg(long)]
    pub threshold: Option<f32>,
}

#[derive(Args)]
pub struct IngestArgs {
    /// JSON array of `{text, url, title, source}` documents
    pub file: PathBuf,

    /// Query recorded in the documents' metadata
    #[arg(long, default_value = "")]
    pub query: String,
}

#[derive(Args)]
pub struct QueryArgs {
    pub query: String,

    /// Documents to fetch for the query; without it only the existing index is searched
    #[arg(long)]
    pub documents: Option<PathBuf>,
}

/// Load `.env` and configuration, then initialize logging
pub fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    Ok(config)
}

/// Build the engine from the loaded configuration
pub async fn build_engine() -> anyhow::Result<(AppConfig, RagEngine)> {
    let config = load_config()?;
    let engine = RagEngine::build(&config).await?;

    Ok((config, engine))
}

/// Print a response as pretty JSON
pub fn print_response(response: &AdminResponse) -> anyhow::Result<()> {
    print_json(response)
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
