use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::identity::Fingerprint;
use crate::storage;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration
    pub node: NodeConfig,

    /// Federation registry database
    pub database: DatabaseConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name
    pub name: String,

    /// Fingerprint of this node's server key
    pub fingerprint: Fingerprint,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Driver: mysql, postgres or sqlite
    pub driver: String,

    pub host: String,

    pub port: u16,

    pub user: String,

    pub password: String,

    /// Database name (file path for sqlite)
    pub dbname: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for file storage
    pub root_dir: PathBuf,

    /// Maximum file size in bytes (0 = unlimited)
    #[serde(default)]
    pub max_file_size: u64,

    /// Chunk size for streaming in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Upper bound for the fingerprint verification callback, in seconds.
    /// Unset means the callback may run forever.
    #[serde(default)]
    pub verify_timeout_secs: Option<u64>,
}

// Default values for configuration options
fn default_max_connections() -> u32 { 5 }
fn default_chunk_size() -> usize { 64 * 1024 } // 64KB

impl DatabaseConfig {
    /// Connection URL understood by sqlx
    pub fn url(&self) -> String {
        if self.driver == "sqlite" {
            return format!("sqlite://{}", self.dbname);
        }

        format!(
            "{}://{}:{}@{}:{}/{}",
            self.driver,
            utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.password, NON_ALPHANUMERIC),
            self.host,
            self.port,
            self.dbname
        )
    }
}

impl AuthConfig {
    pub fn verify_timeout(&self) -> Option<Duration> {
        self.verify_timeout_secs.map(Duration::from_secs)
    }
}

impl From<&StorageConfig> for storage::StorageConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            max_file_size: config.max_file_size,
            chunk_size: config.chunk_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                name: "fileserver-1".to_string(),
                fingerprint: Fingerprint::placeholder(),
            },
            database: DatabaseConfig {
                driver: "mysql".to_string(),
                host: "localhost".to_string(),
                port: 3306,
                user: "fileserver".to_string(),
                password: String::new(),
                dbname: "fileserver".to_string(),
                max_connections: default_max_connections(),
            },
            storage: StorageConfig {
                root_dir: PathBuf::from("./storage"),
                max_file_size: 0, // unlimited
                chunk_size: default_chunk_size(),
            },
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path.as_ref(), content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Create a default config file
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Self::default();
        config.to_file(path)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.database.driver.as_str(), "mysql" | "postgres" | "sqlite") {
            anyhow::bail!("Unsupported database driver: {}", self.database.driver);
        }

        if self.database.dbname.is_empty() {
            anyhow::bail!("Database name cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database pool needs at least one connection");
        }

        // Validate storage path
        if self.storage.root_dir.to_string_lossy().is_empty() {
            anyhow::bail!("Storage root directory cannot be empty");
        }

        // Validate chunk size
        if self.storage.chunk_size == 0 {
            anyhow::bail!("Chunk size must be greater than 0");
        }

        if self.auth.verify_timeout_secs == Some(0) {
            anyhow::bail!("Verification timeout must be greater than 0");
        }

        Ok(())
    }

    /// Ensure all necessary directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.root_dir)
            .context("Failed to create storage directory")?;

        Ok(())
    }
}
