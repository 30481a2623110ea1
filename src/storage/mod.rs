pub mod disk;
pub mod network;

pub use disk::{DiskFileStorage, StoredObject, SweepReport, METADATA_SUFFIX};
pub use network::{connect_pool, NetworkNode, NetworkStorage, SqlNetworkStorage};

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for file storage
    pub root_dir: PathBuf,

    /// Maximum object size in bytes (0 = unlimited)
    pub max_file_size: u64,

    /// Chunk size for streaming (default: 64KB)
    pub chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./storage"),
            max_file_size: 0, // unlimited
            chunk_size: 64 * 1024,
        }
    }
}

/// Length of the random part of a generated attachment name
const FILENAME_RANDOM_LEN: usize = 16;

/// File extension for a MIME type; `bin` when unknown
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or("").trim();

    match essence.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "text/x-vcard" | "text/vcard" => "vcf",
        "text/plain" => "txt",
        "audio/3gpp" => "3gp",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Generate a fresh attachment name such as `attQ3xv9T0aLk2mB1cZ.png`
pub fn generate_filename(mime: &str) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FILENAME_RANDOM_LEN)
        .map(char::from)
        .collect();

    format!("att{}.{}", random, extension_for_mime(mime))
}
