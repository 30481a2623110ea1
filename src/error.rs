use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the credential checker, the object store and the
/// federation directory.
#[derive(Debug, Error)]
pub enum Error {
    /// The credential did not resolve to an identity. Every certificate and
    /// token failure collapses into this one outcome.
    #[error("unauthorized")]
    Unauthorized,

    #[error("malformed challenge response: {0}")]
    MalformedChallengeResponse(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Only one of the two artifacts of an object is on disk.
    #[error("integrity gap for {name}: {reason}")]
    IntegrityGap { name: String, reason: String },

    #[error("checksum mismatch for {name}: recorded {expected}, found {actual}")]
    Corrupted {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("object {name} exceeds the {limit} byte size limit")]
    TooLarge { name: String, limit: u64 },

    #[error("invalid object name: {0:?}")]
    InvalidName(String),

    #[error("invalid metadata in {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("invalid JID: {0:?}")]
    InvalidJid(String),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("federation query failed: {0}")]
    FederationQuery(#[from] sqlx::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
