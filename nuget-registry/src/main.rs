//! Standalone NuGet registry binary
//!
//! `start` serves the registry; `check` runs the archive extractors on a
//! local `.nupkg`/`.snupkg` and prints what an upload would store.

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nuget_registry::nuget::metadata::parse_manifest;
use nuget_registry::nuget::extract_portable_pdbs;
use nuget_registry::types::PackageKind;
use nuget_registry::{run_server, Config};
use serde_json::json;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nuget-server")]
#[command(about = "NuGet V3 package registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry server
    Start {
        /// JSON configuration file
        #[arg(long, default_value = "config.json")]
        config: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for package storage
        #[arg(long)]
        data: Option<PathBuf>,

        /// Externally visible base URL used in feed links
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Inspect a package or symbol package without storing it
    Check {
        /// Path to a .nupkg or .snupkg file
        file: PathBuf,

        /// Configuration file providing the extraction limits
        #[arg(long, default_value = "config.json")]
        config: PathBuf,
    },
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_default();

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if format == "json" {
        registry.with(fmt::layer().with_ansi(false).json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

fn check(file: PathBuf, config: PathBuf) -> Result<()> {
    let config = Config::load_or_default(&config)?;
    let data = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;

    let parsed = parse_manifest(Cursor::new(&data), config.limits.max_manifest_size)?;
    let symbol_ids: Vec<String> = match parsed.kind {
        PackageKind::Symbols => {
            extract_portable_pdbs(Cursor::new(&data), &config.limits)?
                .into_iter()
                .map(|pdb| format!("{}/{}", pdb.name, pdb.id))
                .collect()
        }
        PackageKind::Dependency => Vec::new(),
    };

    let report = json!({
        "id": parsed.id,
        "version": parsed.version,
        "kind": parsed.kind.to_string(),
        "fileName": parsed.file_name(),
        "metadata": parsed.metadata,
        "symbols": symbol_ids,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            host,
            port,
            data,
            public_url,
        } => {
            let mut config = Config::load_or_default(&config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data) = data {
                config.storage.data_dir = data;
            }
            if public_url.is_some() {
                config.server.public_url = public_url;
            }
            config.validate()?;
            run_server(config).await
        }

        Commands::Check { file, config } => check(file, config),
    }
}
