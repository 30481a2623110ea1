//! Authentication and storage plumbing for a federated file upload node.
//!
//! - [`auth`] checks client credentials (OpenPGP, X.509 or a token) against a
//!   keyring and resolves them to a JID.
//! - [`storage`] keeps uploaded objects on disk next to a metadata sidecar and
//!   reads the federation directory from a SQL registry.

pub mod auth;
pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod storage;

pub use error::{Error, Result};
