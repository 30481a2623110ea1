use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info, warn};

use fileserver::config::Config;
use fileserver::storage::{
    self, connect_pool, DiskFileStorage, NetworkStorage, SqlNetworkStorage,
};

/// Get system config file path
fn get_system_config_path() -> PathBuf {
    PathBuf::from("/etc/fileserver/config.toml")
}

/// Get development config file path (fallback)
fn get_dev_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

/// Discover config file with priority order
fn discover_config(cli_path: Option<PathBuf>) -> PathBuf {
    // Priority 1: CLI specified path
    if let Some(path) = cli_path {
        warn!("Using custom config path: {}", path.display());
        return path;
    }

    // Priority 2: System config (production default)
    let system_config = get_system_config_path();
    if system_config.exists() {
        return system_config;
    }

    // Priority 3: Development config ./config.toml
    let dev_config = get_dev_config_path();
    if dev_config.exists() {
        warn!("Using development config: {}", dev_config.display());
        return dev_config;
    }

    system_config
}

#[derive(Parser)]
#[command(name = "fileserver")]
#[command(about = "Federated file upload node: object store and federation directory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the storage root
    Init,

    /// Store a local file as an object
    Store {
        /// MIME type recorded for the object
        #[arg(short, long)]
        mime: String,

        /// File to store
        #[arg(short, long)]
        file: PathBuf,

        /// Object name (generated from the MIME type if omitted)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Fetch an object, verifying its checksum
    Get {
        /// Object name
        #[arg(short, long)]
        name: String,

        /// Write the content here instead of printing metadata only
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check every stored object against its metadata
    Verify,

    /// List the nodes of the federation directory
    ListNodes {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write a default configuration file
    GenConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },

    /// Show version information
    Version,
}

/// Get Rust compiler version
fn get_rustc_version() -> String {
    Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Init) => {
            let config = load_config(cli.config)?;
            init_storage(&config).await?;
        }

        Some(Commands::Store { mime, file, name }) => {
            let config = load_config(cli.config)?;
            store_file(&config, &file, &mime, name).await?;
        }

        Some(Commands::Get { name, output }) => {
            let config = load_config(cli.config)?;
            get_object(&config, &name, output).await?;
        }

        Some(Commands::Verify) => {
            let config = load_config(cli.config)?;
            if !verify_storage(&config).await? {
                std::process::exit(1);
            }
        }

        Some(Commands::ListNodes { json }) => {
            let config = load_config(cli.config)?;
            list_nodes(&config, json).await?;
        }

        Some(Commands::GenConfig { output }) => {
            if output.exists() {
                anyhow::bail!("Refusing to overwrite existing {}", output.display());
            }
            Config::create_default(&output)?;
            info!("Default configuration written to {}", output.display());
        }

        Some(Commands::Version) => {
            show_version();
        }

        None => {
            error!("No command provided. Use --help for usage information.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> Result<Config> {
    let config_path = discover_config(cli_path);
    let config = Config::from_file(&config_path).with_context(|| {
        format!(
            "Failed to load config from {}. Run 'fileserver gen-config' first",
            config_path.display()
        )
    })?;
    config.validate()?;
    Ok(config)
}

fn open_storage(config: &Config) -> DiskFileStorage {
    DiskFileStorage::new(storage::StorageConfig::from(&config.storage))
}

async fn init_storage(config: &Config) -> Result<()> {
    config.ensure_directories()?;
    open_storage(config).initialize().await?;

    info!("Node {} ({})", config.node.name, config.node.fingerprint);
    info!("Storage ready at {}", config.storage.root_dir.display());

    Ok(())
}

async fn store_file(
    config: &Config,
    file_path: &PathBuf,
    mime: &str,
    name: Option<String>,
) -> Result<()> {
    let storage = open_storage(config);
    storage.initialize().await?;

    let name = name.unwrap_or_else(|| storage::generate_filename(mime));
    let file = tokio::fs::File::open(file_path)
        .await
        .with_context(|| format!("Failed to open {}", file_path.display()))?;

    let path = storage.store_stream(&name, mime, file).await?;
    let size = tokio::fs::metadata(&path).await?.len();

    println!("{}", name);
    info!("Stored {} ({}) at {}", name, format_size(size), path.display());

    Ok(())
}

async fn get_object(config: &Config, name: &str, output: Option<PathBuf>) -> Result<()> {
    let storage = open_storage(config);

    let Some((object, data)) = storage.retrieve_data(name).await? else {
        anyhow::bail!("Object not found: {}", name);
    };

    println!("Name:     {}", object.name);
    println!("MIME:     {}", object.mime_type);
    println!("MD5:      {}", object.checksum);
    println!("Size:     {}", format_size(data.len() as u64));

    if let Some(output) = output {
        tokio::fs::write(&output, &data)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!("Written to {}", output.display());
    }

    Ok(())
}

/// Returns false when the sweep found problems
async fn verify_storage(config: &Config) -> Result<bool> {
    let storage = open_storage(config);
    let report = storage.sweep().await?;

    for issue in &report.issues {
        println!("{}", issue);
    }

    println!(
        "Checked {} objects, {} problems",
        report.checked,
        report.issues.len()
    );

    Ok(report.is_clean())
}

async fn list_nodes(config: &Config, json: bool) -> Result<()> {
    let pool = connect_pool(&config.database)
        .await
        .context("Failed to connect to the federation registry")?;

    let directory = SqlNetworkStorage::new(pool.clone());
    let nodes = directory.list_nodes().await;
    pool.close().await;
    let nodes = nodes?;

    if json {
        let list: Vec<_> = nodes.values().collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("\nFederation nodes:");
    println!("{:<42} {:<40} {:<8}", "Fingerprint", "Host", "Enabled");
    println!("{}", "-".repeat(92));

    for node in nodes.values() {
        let marker = if node.fingerprint == config.node.fingerprint { " *" } else { "" };
        println!(
            "{:<42} {:<40} {:<8}",
            format!("{}{}", node.fingerprint, marker),
            node.host,
            if node.enabled { "yes" } else { "no" }
        );
    }

    Ok(())
}

fn show_version() {
    println!("fileserver {}", env!("CARGO_PKG_VERSION"));
    println!("Rust Version: {}", get_rustc_version());
    println!(
        "Binary: {}",
        std::env::current_exe()
            .unwrap_or_else(|_| PathBuf::from("unknown"))
            .display()
    );
    println!();
    println!("Configuration:");

    let config_paths = [get_system_config_path(), get_dev_config_path()];
    for (i, path) in config_paths.iter().enumerate() {
        let status = if path.exists() { "found" } else { "missing" };
        println!("  {}. {} ({})", i + 1, path.display(), status);
    }
}

fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}
