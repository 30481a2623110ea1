use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::StorageConfig;
use crate::digest;
use crate::error::{Error, Result};

/// Suffix of the metadata sidecar stored next to each object
pub const METADATA_SUFFIX: &str = ".properties";

const TEMP_SUFFIX: &str = ".tmp";
const MIME_KEY: &str = "mime";
const CHECKSUM_KEY: &str = "md5sum";

/// A stored object as described by its sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    /// Path of the content artifact
    pub path: PathBuf,
    pub mime_type: String,
    /// Hex MD5 of the content as it was persisted
    pub checksum: String,
}

/// Outcome of a consistency sweep over the storage root
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Number of object names inspected
    pub checked: usize,
    /// Objects that failed verification
    pub issues: Vec<Error>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Object store keeping each object as `<root>/<name>` plus a
/// `<root>/<name>.properties` sidecar.
///
/// There is no locking: concurrent writes to one name race, and callers that
/// need exclusivity must serialize per name themselves.
#[derive(Debug, Clone)]
pub struct DiskFileStorage {
    config: StorageConfig,
}

impl DiskFileStorage {
    /// Create a store rooted at `config.root_dir`. Call
    /// [`initialize`](Self::initialize) before first use.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root_dir
    }

    /// Create the storage root if it does not exist yet
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.config.root_dir).await?;
        info!("Storage initialized at {}", self.config.root_dir.display());
        Ok(())
    }

    /// Store an in-memory payload; returns the content path
    pub async fn store_bytes(&self, name: &str, mime_type: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.content_path(name)?;
        validate_mime(&path, mime_type)?;
        self.check_size(name, content.len() as u64)?;

        let temp_path = temp_path(&path);
        let written = async {
            let mut file = File::create(&temp_path).await?;
            file.write_all(content).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            discard(&temp_path).await;
            return Err(e.into());
        }

        self.commit(name, &temp_path, &path, mime_type).await
    }

    /// Store a payload read from `source` in `chunk_size` pieces
    pub async fn store_stream<R>(&self, name: &str, mime_type: &str, mut source: R) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin,
    {
        let path = self.content_path(name)?;
        validate_mime(&path, mime_type)?;

        let temp_path = temp_path(&path);
        let mut file = File::create(&temp_path).await?;
        let mut buffer = vec![0u8; self.config.chunk_size.max(1)];
        let mut bytes_written = 0u64;

        let written = async {
            loop {
                let n = source.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }

                bytes_written += n as u64;
                self.check_size(name, bytes_written)?;
                file.write_all(&buffer[..n]).await?;

                debug!("Wrote {} bytes to {} (total: {})", n, name, bytes_written);
            }
            file.sync_all().await?;
            Ok::<(), Error>(())
        }
        .await;

        drop(file);
        if let Err(e) = written {
            discard(&temp_path).await;
            return Err(e);
        }

        self.commit(name, &temp_path, &path, mime_type).await
    }

    /// Look up an object. `None` unless both the content and the sidecar exist.
    pub async fn retrieve(&self, name: &str) -> Result<Option<StoredObject>> {
        let path = self.content_path(name)?;
        let metadata_path = metadata_path(&path);

        if !is_file(&path).await? || !is_file(&metadata_path).await? {
            debug!("Object {} is not fully present", name);
            return Ok(None);
        }

        let (mime_type, checksum) = read_metadata(&metadata_path).await?;

        Ok(Some(StoredObject {
            name: name.to_string(),
            path,
            mime_type,
            checksum,
        }))
    }

    /// Like [`retrieve`](Self::retrieve) but also returns the content, which
    /// must still match the recorded checksum
    pub async fn retrieve_data(&self, name: &str) -> Result<Option<(StoredObject, Vec<u8>)>> {
        let Some(object) = self.retrieve(name).await? else {
            return Ok(None);
        };

        let data = match fs::read(&object.path).await {
            Ok(data) => data,
            // removed between the presence check and the read
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let actual = digest::md5_hex(&data);
        if actual != object.checksum {
            return Err(Error::Corrupted {
                name: name.to_string(),
                expected: object.checksum,
                actual,
            });
        }

        Ok(Some((object, data)))
    }

    /// Check a single object: both artifacts present and checksum matching
    pub async fn verify(&self, name: &str) -> Result<StoredObject> {
        let path = self.content_path(name)?;
        let metadata_path = metadata_path(&path);

        let object = match (is_file(&path).await?, is_file(&metadata_path).await?) {
            (false, false) => return Err(Error::ObjectNotFound(name.to_string())),
            (true, false) => {
                return Err(Error::IntegrityGap {
                    name: name.to_string(),
                    reason: "content without metadata".to_string(),
                })
            }
            (false, true) => {
                return Err(Error::IntegrityGap {
                    name: name.to_string(),
                    reason: "metadata without content".to_string(),
                })
            }
            (true, true) => {
                let (mime_type, checksum) = read_metadata(&metadata_path).await?;
                StoredObject {
                    name: name.to_string(),
                    path,
                    mime_type,
                    checksum,
                }
            }
        };

        let actual = digest::md5_file(&object.path).await?;
        if actual != object.checksum {
            return Err(Error::Corrupted {
                name: name.to_string(),
                expected: object.checksum,
                actual,
            });
        }

        Ok(object)
    }

    /// Verify every object under the root, including half-written ones.
    ///
    /// Temporary files left behind by interrupted stores are reported too.
    /// A store running concurrently with the sweep shows up the same way.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let root = self.config.root_dir.clone();
        let (names, leftovers) = tokio::task::spawn_blocking(move || scan_root(&root))
            .await
            .map_err(std::io::Error::other)?;

        let mut report = SweepReport::default();
        for file_name in leftovers {
            report.checked += 1;
            let issue = Error::IntegrityGap {
                name: file_name,
                reason: "leftover temporary file".to_string(),
            };
            warn!("Consistency sweep: {}", issue);
            report.issues.push(issue);
        }

        for name in names {
            report.checked += 1;
            if let Err(e) = self.verify(&name).await {
                warn!("Consistency sweep: {}", e);
                report.issues.push(e);
            }
        }

        info!(
            "Consistency sweep checked {} objects, {} issues",
            report.checked,
            report.issues.len()
        );
        Ok(report)
    }

    /// Move freshly written content into place, then checksum it from disk
    /// and write the sidecar
    async fn commit(&self, name: &str, temp_path: &Path, path: &Path, mime_type: &str) -> Result<PathBuf> {
        let metadata_path = metadata_path(path);

        // stale metadata must not be paired with the new content
        let replaced = async {
            remove_if_exists(&metadata_path).await?;
            fs::rename(temp_path, path).await?;
            Ok::<(), Error>(())
        }
        .await;

        if let Err(e) = replaced {
            discard(temp_path).await;
            return Err(e);
        }

        let checksum = digest::md5_file(path).await?;
        write_metadata(&metadata_path, mime_type, &checksum).await?;

        info!("Stored {} ({}, md5 {})", name, mime_type, checksum);
        Ok(path.to_path_buf())
    }

    fn content_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.config.root_dir.join(name))
    }

    fn check_size(&self, name: &str, size: u64) -> Result<()> {
        let limit = self.config.max_file_size;
        if limit > 0 && size > limit {
            return Err(Error::TooLarge {
                name: name.to_string(),
                limit,
            });
        }
        Ok(())
    }
}

/// Names are single path components. Leading dots are reserved for
/// temporary files and the sidecar suffix for metadata.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.ends_with(METADATA_SUFFIX)
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_mime(path: &Path, mime_type: &str) -> Result<()> {
    if mime_type.trim().is_empty() || mime_type.contains(['\r', '\n']) {
        return Err(Error::InvalidMetadata {
            path: metadata_path(path),
            reason: format!("unusable MIME type {:?}", mime_type),
        });
    }
    Ok(())
}

fn metadata_path(content_path: &Path) -> PathBuf {
    let mut path = content_path.as_os_str().to_owned();
    path.push(METADATA_SUFFIX);
    PathBuf::from(path)
}

/// Hidden sibling used while a file is being written
fn temp_path(path: &Path) -> PathBuf {
    let mut file_name = std::ffi::OsString::from(".");
    if let Some(name) = path.file_name() {
        file_name.push(name);
    }
    file_name.push(TEMP_SUFFIX);
    path.with_file_name(file_name)
}

async fn write_metadata(path: &Path, mime_type: &str, checksum: &str) -> Result<()> {
    let content = format!("{}={}\n{}={}\n", MIME_KEY, mime_type, CHECKSUM_KEY, checksum);

    let temp_path = temp_path(path);
    let written = async {
        let mut file = File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        discard(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

async fn read_metadata(path: &Path) -> Result<(String, String)> {
    let content = fs::read_to_string(path).await?;
    parse_metadata(path, &content)
}

/// Parse sidecar `key=value` lines into (mime, md5sum)
fn parse_metadata(path: &Path, content: &str) -> Result<(String, String)> {
    let invalid = |reason: String| Error::InvalidMetadata {
        path: path.to_path_buf(),
        reason,
    };

    let mut entries = HashMap::new();
    for line in content.lines().filter(|line| !line.trim().is_empty()) {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| invalid(format!("malformed line {:?}", line)))?;
        entries.insert(key, value);
    }

    let mime_type = entries
        .get(MIME_KEY)
        .ok_or_else(|| invalid(format!("missing {}", MIME_KEY)))?;
    let checksum = entries
        .get(CHECKSUM_KEY)
        .ok_or_else(|| invalid(format!("missing {}", CHECKSUM_KEY)))?;

    Ok((mime_type.to_string(), checksum.to_string()))
}

async fn is_file(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Object names found under `root` (from content or sidecar files), and
/// the hidden temporary files sitting next to them
fn scan_root(root: &Path) -> (BTreeSet<String>, Vec<String>) {
    let mut names = BTreeSet::new();
    let mut leftovers = Vec::new();

    let files = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());

    for entry in files {
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };

        if is_hidden(&entry) {
            if file_name.ends_with(TEMP_SUFFIX) {
                leftovers.push(file_name.to_string());
            }
            continue;
        }

        let name = file_name.strip_suffix(METADATA_SUFFIX).unwrap_or(file_name);
        names.insert(name.to_string());
    }

    (names, leftovers)
}

/// Check if directory entry is hidden
fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
