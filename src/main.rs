//! Binary entry point for spacesearch.
//!
//! Inspects and maintains the configured persistent index. Talking to a
//! storage gateway is left to the services embedding the library.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spacesearch::config::SearchConfig;
use spacesearch::models::{Match, ResourceId, SearchIndexRequest, SpaceId};
use spacesearch::observability::{self, InitOptions};
use spacesearch::services::{BackendFactory, format_query};
use spacesearch::storage::IndexBackend;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Spacesearch - federated search over storage spaces.
#[derive(Parser)]
#[command(name = "spacesearch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "SPACESEARCH_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Search the index.
    Search {
        /// The query. Without a `Field:` qualifier it matches names.
        query: String,

        /// Restrict to one space (`storage$space`).
        #[arg(short, long)]
        root: Option<String>,

        /// Restrict to a path prefix within the space, e.g. `./docs`.
        #[arg(short, long, requires = "root")]
        path: Option<String>,

        /// Maximum number of results (`0` default, `-1` unlimited).
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        limit: i32,

        /// Print matches as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show index status.
    Status,

    /// Show a single index entry.
    Show {
        /// Resource id (`storage$space!opaque`).
        id: String,
    },

    /// Permanently remove a single index entry.
    Purge {
        /// Resource id (`storage$space!opaque`).
        id: String,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match SearchConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &SearchConfig) -> Result<()> {
    match cli.command {
        Commands::Search {
            query,
            root,
            path,
            limit,
            json,
        } => cmd_search(config, &query, root, path, limit, json),
        Commands::Status => cmd_status(config),
        Commands::Show { id } => cmd_show(config, &id),
        Commands::Purge { id } => cmd_purge(config, &id),
    }
}

fn open_index(config: &SearchConfig) -> Result<Arc<dyn IndexBackend>> {
    let path = config.index_path();
    BackendFactory::create_index_backend(config.index.backend, &path)
        .with_context(|| format!("failed to open index at {}", path.display()))
}

/// Search command.
fn cmd_search(
    config: &SearchConfig,
    query: &str,
    root: Option<String>,
    path: Option<String>,
    limit: i32,
    json: bool,
) -> Result<()> {
    let index = open_index(config)?;

    let mut request = SearchIndexRequest::new(format_query(query)).with_page_size(limit);
    if let Some(root) = root {
        let space = SpaceId::parse(&root).with_context(|| format!("invalid space id: {root}"))?;
        request = request.scoped(space.root(), path.as_deref().unwrap_or("."));
    }
    if limit == 0 {
        request = request.with_page_size(config.search.default_page_size);
    }

    let response = index.search(&request)?;

    if json {
        for hit in &response.matches {
            println!("{}", serde_json::to_string(hit)?);
        }
        return Ok(());
    }

    println!(
        "Found {} matches, showing {}:",
        response.total_matches,
        response.matches.len()
    );
    println!();
    for hit in &response.matches {
        print_match(hit);
    }

    Ok(())
}

fn print_match(hit: &Match) {
    let entity = &hit.entity;
    println!(
        "  [{:.2}] {} ({})",
        hit.score, entity.reference.path, entity.resource_type
    );
    println!("       id: {}", entity.id);
    if let Some(highlights) = &entity.highlights {
        println!("       {highlights}");
    }
    println!();
}

/// Status command.
fn cmd_status(config: &SearchConfig) -> Result<()> {
    println!("Spacesearch Status");
    println!("==================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Backend: {}", config.index.backend);
    println!("Index Path: {}", config.index_path().display());

    let index = open_index(config)?;
    println!("Documents: {}", index.doc_count()?);

    let key_status = if config.machine_auth_api_key.is_some() {
        "Configured"
    } else {
        "Not set (SPACESEARCH_MACHINE_AUTH_API_KEY)"
    };
    println!("Machine Auth Key: {key_status}");

    Ok(())
}

/// Show command.
fn cmd_show(config: &SearchConfig, id: &str) -> Result<()> {
    let id = ResourceId::parse(id)?;
    let index = open_index(config)?;

    let resource = index
        .get(&id)?
        .with_context(|| format!("{id} is not indexed"))?;
    println!("{}", serde_json::to_string_pretty(&resource)?);
    Ok(())
}

/// Purge command.
fn cmd_purge(config: &SearchConfig, id: &str) -> Result<()> {
    let id = ResourceId::parse(id)?;
    let index = open_index(config)?;

    if index.purge(&id)? {
        println!("Purged {id}");
    } else {
        println!("{id} was not indexed");
    }
    Ok(())
}
