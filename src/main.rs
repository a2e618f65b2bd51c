//! Repograph CLI - index a Go repository into SQLite

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use repograph::config::{self, RepographConfig};
use repograph::storage::SqliteStore;
use repograph::{ModuleInfo, Staleness, SyncOptions};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "repograph")]
#[command(version)]
#[command(about = "Relational index of a Go repository: packages, files, symbols, imports and call dependencies")]
#[command(long_about = r#"
Repograph walks a Go module, parses every non-test source file and stores
packages, declarations, imports and intra-module call edges in SQLite.

Example usage:
  repograph init
  repograph sync --path ./service
  repograph status --json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to <module root>/repograph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config, create the state directory and an empty index
    Init {
        /// Any directory inside the module
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Rebuild the index
    Sync {
        /// Any directory inside the module
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report whether the index is fresh and what it contains
    Status {
        /// Any directory inside the module
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path, force } => {
            let module = ModuleInfo::resolve(&path)?;
            let config_path = cli.config.unwrap_or_else(|| config::default_config_path(&module.root));

            config::write_config(&config_path, &RepographConfig::default(), force)?;
            let db_path = RepographConfig::default().database_path(&module.root);
            config::ensure_db_dir(&db_path)?;
            config::ensure_gitignore(&module.root)?;
            SqliteStore::open(&db_path)?;

            println!("Initialized {} ({})", module.path, module.root.display());
            println!("  Config:   {}", config_path.display());
            println!("  Database: {}", db_path.display());
        }

        Commands::Sync { path, json } => {
            let (module, cfg) = load(&path, cli.config.as_deref())?;
            let db_path = cfg.database_path(&module.root);
            config::ensure_db_dir(&db_path)?;
            let mut store = SqliteStore::open(&db_path)
                .with_context(|| format!("failed to open {}", db_path.display()))?;

            let options = SyncOptions {
                excludes: cfg.exclude.clone(),
                ..Default::default()
            };
            let result = repograph::sync_with(&mut store, &path, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Synced {} at {}", module.path, result.synced_at.to_rfc3339());
                println!("  Files: {}", result.indexed_files);
                println!("  Symbols: {}", result.indexed_symbols);
                println!("  Packages: {}", result.indexed_packages);
                if !result.revision.is_empty() {
                    let dirty = if result.dirty { " (dirty)" } else { "" };
                    println!("  Revision: {}{}", result.revision, dirty);
                }
                match result.diff {
                    Some(diff) => println!(
                        "  Changes: +{} -{} ~{} files, symbols {} -> {}",
                        diff.files_added, diff.files_removed, diff.files_modified, diff.symbols_before, diff.symbols_after
                    ),
                    None => println!("  First sync"),
                }
            }
        }

        Commands::Status { path, json } => {
            let (module, cfg) = load(&path, cli.config.as_deref())?;
            let db_path = cfg.database_path(&module.root);
            if !db_path.exists() {
                anyhow::bail!("no index at {} (run `repograph init` or `repograph sync`)", db_path.display());
            }
            let store = SqliteStore::open(&db_path)?;

            let staleness = repograph::check_staleness(&store, &path, &cfg.exclude)?;
            let stats = store.stats()?;
            let state = store.sync_state()?;

            if json {
                let data = serde_json::json!({
                    "module": module.path,
                    "staleness": staleness,
                    "lastSync": state,
                    "stats": stats,
                });
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                match &staleness {
                    Staleness::NeverSynced => println!("Never synced"),
                    Staleness::Fresh => println!("Index is up to date"),
                    Staleness::Stale { reasons } => {
                        println!("Index is stale:");
                        for reason in reasons {
                            println!("  - {}", reason);
                        }
                    }
                }
                if let Some(state) = state {
                    println!("Last sync: {} ({} files)", state.synced_at.to_rfc3339(), state.indexed_files);
                }
                println!("{}", stats);
            }
        }
    }

    Ok(())
}

/// Resolve the module for `path` and read its config, falling back to defaults.
fn load(path: &Path, config_path: Option<&Path>) -> anyhow::Result<(ModuleInfo, RepographConfig)> {
    let module = ModuleInfo::resolve(path)?;
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config::default_config_path(&module.root));
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?
        .unwrap_or_default();
    Ok((module, cfg))
}
