use std::sync::Arc;
use tracing::{debug, info};

use super::keyring::Keyring;
use super::verify::VerifyCallback;
use super::Credential;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::{Fingerprint, Jid};

/// Turns presented credentials into authenticated identities.
///
/// Built once per node and shared by every request handler. Holds no
/// per-request state, so clones and concurrent calls are independent.
#[derive(Clone)]
pub struct CredentialChecker {
    fingerprint: Fingerprint,
    keyring: Arc<dyn Keyring>,
    verify: Option<VerifyCallback>,
}

impl CredentialChecker {
    /// Create a checker for the node identified by `fingerprint`
    pub fn new(fingerprint: Fingerprint, keyring: Arc<dyn Keyring>) -> Self {
        info!(%fingerprint, "Credential checker initialized");
        Self {
            fingerprint,
            keyring,
            verify: None,
        }
    }

    /// Checker for the node described by `config`. The configured
    /// verification timeout applies to `callback` unless it already has one.
    pub fn from_config(
        config: &Config,
        keyring: Arc<dyn Keyring>,
        callback: Option<VerifyCallback>,
    ) -> Self {
        let checker = Self::new(config.node.fingerprint.clone(), keyring);

        match (callback, config.auth.verify_timeout()) {
            (Some(callback), Some(timeout)) if callback.timeout().is_none() => {
                checker.with_verify_callback(callback.with_timeout(timeout))
            }
            (Some(callback), _) => checker.with_verify_callback(callback),
            (None, _) => checker,
        }
    }

    /// Cross-check certificate identities with `callback`
    pub fn with_verify_callback(mut self, callback: VerifyCallback) -> Self {
        self.verify = Some(callback);
        self
    }

    /// This node's fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Authenticate a credential, failing with [`Error::Unauthorized`] when it
    /// does not resolve to an identity
    pub async fn authenticate(&self, credential: &Credential) -> Result<Jid> {
        let identity = credential
            .check(&self.fingerprint, self.keyring.as_ref(), self.verify.as_ref())
            .await;

        match identity {
            Some(jid) => {
                debug!(%jid, kind = credential.kind(), "Credential accepted");
                Ok(jid)
            }
            None => {
                debug!(kind = credential.kind(), "Credential rejected");
                Err(Error::Unauthorized)
            }
        }
    }
}

impl std::fmt::Debug for CredentialChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialChecker")
            .field("fingerprint", &self.fingerprint)
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}
