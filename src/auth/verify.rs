use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::identity::{Fingerprint, Jid};

/// Secondary check run after a certificate resolved to an identity, e.g.
/// against previously bound fingerprint-to-identity records.
///
/// Returning `None` rejects the credential; returning an identity replaces
/// the one derived from the certificate.
#[async_trait]
pub trait FingerprintVerifier: Send + Sync {
    async fn verify(&self, jid: Jid, fingerprint: Fingerprint) -> Option<Jid>;
}

struct FnVerifier<F>(F);

#[async_trait]
impl<F, Fut> FingerprintVerifier for FnVerifier<F>
where
    F: Fn(Jid, Fingerprint) -> Fut + Send + Sync,
    Fut: Future<Output = Option<Jid>> + Send + 'static,
{
    async fn verify(&self, jid: Jid, fingerprint: Fingerprint) -> Option<Jid> {
        (self.0)(jid, fingerprint).await
    }
}

/// Verification callback handed to the credential checker
#[derive(Clone)]
pub struct VerifyCallback {
    verifier: Arc<dyn FingerprintVerifier>,
    timeout: Option<Duration>,
}

impl VerifyCallback {
    pub fn new<V: FingerprintVerifier + 'static>(verifier: V) -> Self {
        Self {
            verifier: Arc::new(verifier),
            timeout: None,
        }
    }

    /// Build a callback from an async closure
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Jid, Fingerprint) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Jid>> + Send + 'static,
    {
        Self::new(FnVerifier(f))
    }

    /// Bound how long the callback may take. Without a timeout a callback
    /// that never resolves stalls the check forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) async fn run(&self, jid: Jid, fingerprint: Fingerprint) -> Option<Jid> {
        let Some(limit) = self.timeout else {
            return self.verifier.verify(jid, fingerprint).await;
        };

        let subject = jid.to_string();
        match tokio::time::timeout(limit, self.verifier.verify(jid, fingerprint)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(jid = %subject, ?limit, "Verification callback timed out");
                None
            }
        }
    }
}

impl fmt::Debug for VerifyCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyCallback")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Deny;

    #[async_trait]
    impl FingerprintVerifier for Deny {
        async fn verify(&self, _jid: Jid, _fingerprint: Fingerprint) -> Option<Jid> {
            None
        }
    }

    fn sample() -> (Jid, Fingerprint) {
        (
            Jid::parse("alice@example.com").unwrap(),
            Fingerprint::parse(&"AB".repeat(20)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_trait_object_verifier() {
        let (jid, fpr) = sample();
        assert!(VerifyCallback::new(Deny).run(jid, fpr).await.is_none());
    }

    #[tokio::test]
    async fn test_closure_verifier() {
        let (jid, fpr) = sample();
        let callback = VerifyCallback::from_fn(|jid, _fpr| async move { Some(jid) });
        assert_eq!(callback.run(jid.clone(), fpr).await, Some(jid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_stalled_callback() {
        let (jid, fpr) = sample();
        let callback = VerifyCallback::from_fn(|jid, _fpr| async move {
            std::future::pending::<()>().await;
            Some(jid)
        })
        .with_timeout(Duration::from_secs(5));

        assert!(callback.run(jid, fpr).await.is_none());
    }
}
