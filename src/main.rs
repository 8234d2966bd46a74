//! graphload - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use graphload::{Loader, LoaderConfig, cache};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "graphload")]
#[command(about = "Caching-aware graph model loader", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL or directory prefix for model paths
    #[arg(long)]
    base_path: Option<String>,

    /// Cache root directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable persisting fetched models to the cache
    #[arg(long)]
    no_cache: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one or more models and print their size statistics
    Load {
        /// Model paths, joined with the base path
        models: Vec<String>,
    },
    /// List cached models with sizes
    List,
    /// Remove cached models
    Evict {
        /// Model to evict
        model: Option<String>,

        /// Evict every cached model
        #[arg(long)]
        all: bool,
    },
    /// Show cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
    }

    // Load configuration
    let mut config = LoaderConfig::load(cli.config)?;

    // CLI overrides
    if let Some(base_path) = cli.base_path {
        config.model_base_path = base_path;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_dir = Some(cache_dir);
    }
    if cli.no_cache {
        config.cache_models = false;
    }

    config.validate()?;

    let loader = Loader::new(config);
    let root = loader.cache_root();

    match cli.command {
        Command::Load { models } => {
            if models.is_empty() {
                anyhow::bail!("no models given; pass at least one model path");
            }

            for model in &models {
                loader
                    .load(model)
                    .await
                    .with_context(|| format!("Failed to load model '{}'", model))?;
            }

            for info in loader.stats().snapshot().await {
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
        }

        Command::List => {
            for name in cache::list_cached(&root) {
                let size = cache::cached_size(&root, &name).unwrap_or(0);
                println!("{:<40} {:>12} bytes", name, size);
            }
        }

        Command::Evict { model, all } => {
            if all {
                let evicted = cache::evict_all(&root)?;
                for name in &evicted {
                    println!("evicted {}", name);
                }
                tracing::info!(count = evicted.len(), "cache cleared");
            } else if let Some(model) = model {
                cache::evict(&root, &model)?;
                println!("evicted {}", model);
            } else {
                anyhow::bail!("pass a model name or --all");
            }
        }

        Command::Stats => {
            let models = cache::list_cached(&root);
            println!("cache root: {}", root.display());
            println!("cached models: {}", models.len());
            for name in &models {
                let size = cache::cached_size(&root, name).unwrap_or(0);
                println!("  {:<38} {:>12} bytes", name, size);
            }
            println!("total: {} bytes", cache::total_size(&root));
        }
    }

    Ok(())
}
