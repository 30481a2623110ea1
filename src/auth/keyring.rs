use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::certificate::X509Certificate;
use crate::identity::{Fingerprint, Jid};

/// OpenPGP user id, e.g. `Alice (phone) <alice@example.com>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(String);

impl UserId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address component of the user id.
    ///
    /// Taken from the last `<...>` group; a bare `local@domain` user id is its
    /// own address.
    pub fn email(&self) -> Option<&str> {
        let uid = self.0.trim();

        if let Some(start) = uid.rfind('<') {
            let rest = &uid[start + 1..];
            let end = rest.find('>')?;
            let address = rest[..end].trim();
            return (!address.is_empty()).then_some(address);
        }

        (uid.contains('@') && !uid.contains(char::is_whitespace)).then_some(uid)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public key as known to the keyring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub fingerprint: Fingerprint,
    pub user_ids: Vec<UserId>,
}

impl PublicKey {
    pub fn new(fingerprint: Fingerprint, user_ids: Vec<UserId>) -> Self {
        Self {
            fingerprint,
            user_ids,
        }
    }

    /// First user id on the key
    pub fn primary_user_id(&self) -> Option<&UserId> {
        self.user_ids.first()
    }
}

/// Trust store consulted by credential checks.
///
/// Implementations are shared across concurrent checks via
/// `Arc<dyn Keyring>` and are only read through this trait. A `None` result
/// means "not known / not trusted"; errors are reserved for failures inside
/// the keyring itself. Callers fold both into a rejected credential.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Resolve an X.509 certificate to the fingerprint of the key it certifies
    async fn resolve_certificate(&self, cert: &X509Certificate) -> Result<Option<Fingerprint>>;

    /// Look up a public key by fingerprint
    async fn get_key(&self, fingerprint: &Fingerprint) -> Result<Option<PublicKey>>;

    /// Confirm `key` is the key bound to `user`; returns the bound fingerprint
    async fn check_user_key(&self, key: &PublicKey, user: &str) -> Result<Option<Fingerprint>>;

    /// Validate an opaque authentication token
    async fn validate_token(&self, token: &[u8]) -> Result<Option<Jid>>;
}

#[derive(Default)]
struct KeyringState {
    keys: HashMap<Fingerprint, PublicKey>,
    /// X.509 certificate digest -> key fingerprint
    certificates: HashMap<String, Fingerprint>,
    /// user component -> bound key fingerprint
    bindings: HashMap<String, Fingerprint>,
    tokens: HashMap<Vec<u8>, Jid>,
}

/// In-memory keyring for tests and single-process deployments
pub struct MemoryKeyring {
    state: Arc<RwLock<KeyringState>>,
}

impl MemoryKeyring {
    /// Create an empty keyring
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(KeyringState::default())),
        }
    }

    /// Add or replace a public key
    pub fn add_key(&self, key: PublicKey) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        state.keys.insert(key.fingerprint.clone(), key);
        Ok(())
    }

    /// Record which key an X.509 certificate was issued for
    pub fn add_certificate(&self, cert: &X509Certificate, fingerprint: Fingerprint) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        state.certificates.insert(cert.digest(), fingerprint);
        Ok(())
    }

    /// Bind a user to a key fingerprint
    pub fn bind_user(&self, user: &str, fingerprint: Fingerprint) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        state.bindings.insert(user.to_lowercase(), fingerprint);
        Ok(())
    }

    /// Register a pre-issued token
    pub fn add_token(&self, token: impl Into<Vec<u8>>, jid: Jid) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        state.tokens.insert(token.into(), jid);
        Ok(())
    }
}

impl Default for MemoryKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryKeyring {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Keyring for MemoryKeyring {
    async fn resolve_certificate(&self, cert: &X509Certificate) -> Result<Option<Fingerprint>> {
        let state = self
            .state
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(state.certificates.get(&cert.digest()).cloned())
    }

    async fn get_key(&self, fingerprint: &Fingerprint) -> Result<Option<PublicKey>> {
        let state = self
            .state
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(state.keys.get(fingerprint).cloned())
    }

    async fn check_user_key(&self, key: &PublicKey, user: &str) -> Result<Option<Fingerprint>> {
        let state = self
            .state
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;

        Ok(state
            .bindings
            .get(&user.to_lowercase())
            .filter(|bound| **bound == key.fingerprint)
            .cloned())
    }

    async fn validate_token(&self, token: &[u8]) -> Result<Option<Jid>> {
        if token.is_empty() {
            anyhow::bail!("empty token");
        }

        let state = self
            .state
            .read()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {}", e))?;
        Ok(state.tokens.get(token).cloned())
    }
}
