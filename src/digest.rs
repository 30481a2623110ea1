use md5::{Digest, Md5};
use ring::digest;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 8192;

/// Hex MD5 of an in-memory buffer
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Hex SHA-1 of an in-memory buffer
pub fn sha1_hex(data: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data);
    hex::encode(digest.as_ref())
}

/// Hex SHA-256 of an in-memory buffer, uppercase
pub fn sha256_hex_upper(data: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, data);
    hex::encode_upper(digest.as_ref())
}

/// Calculate the MD5 of a file by streaming it from disk
pub async fn md5_file<P: AsRef<Path>>(path: P) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
