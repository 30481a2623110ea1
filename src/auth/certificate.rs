use anyhow::Result as AnyResult;
use tracing::debug;

use super::keyring::{Keyring, UserId};
use super::verify::VerifyCallback;
use crate::digest;
use crate::error::{Error, Result};
use crate::identity::{Fingerprint, Jid};

/// OpenPGP certificate presented during the TLS handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPgpCertificate {
    pub fingerprint: Fingerprint,
    pub user_ids: Vec<UserId>,
}

impl OpenPgpCertificate {
    pub fn new(fingerprint: Fingerprint, user_ids: Vec<UserId>) -> Self {
        Self {
            fingerprint,
            user_ids,
        }
    }

    /// Identity from the primary user id, paired with the certificate's own fingerprint
    fn identity(&self) -> Option<(Jid, Fingerprint)> {
        let address = self.user_ids.first().and_then(UserId::email)?;

        match Jid::parse(address) {
            Ok(jid) => Some((jid, self.fingerprint.clone())),
            Err(e) => {
                debug!(fingerprint = %self.fingerprint, error = %e, "Unusable OpenPGP user id");
                None
            }
        }
    }
}

/// DER-encoded X.509 certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Certificate {
    der: Vec<u8>,
}

impl X509Certificate {
    /// Wrap DER bytes, rejecting anything that does not parse as X.509
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        x509_parser::parse_x509_certificate(&der)
            .map_err(|e| Error::InvalidCertificate(e.to_string()))?;
        Ok(Self { der })
    }

    /// Parse a PEM `CERTIFICATE` block
    pub fn from_pem(certificate_pem: &str) -> Result<Self> {
        let pem = pem::parse(certificate_pem).map_err(|e| Error::InvalidCertificate(e.to_string()))?;

        if pem.tag() != "CERTIFICATE" {
            return Err(Error::InvalidCertificate(format!(
                "unexpected PEM block {}",
                pem.tag()
            )));
        }

        Self::from_der(pem.contents().to_vec())
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 of the DER encoding, uppercase hex
    pub fn digest(&self) -> String {
        digest::sha256_hex_upper(&self.der)
    }

    /// Subject distinguished name, for diagnostics
    pub fn subject(&self) -> Option<String> {
        x509_parser::parse_x509_certificate(&self.der)
            .ok()
            .map(|(_, cert)| cert.subject().to_string())
    }
}

/// Kind of certificate carried by a [`CertificateCredential`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
    OpenPgp(OpenPgpCertificate),
    X509(X509Certificate),
}

/// Credential backed by a client certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCredential {
    certificate: Certificate,
}

impl CertificateCredential {
    pub fn new(certificate: Certificate) -> Self {
        Self { certificate }
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) async fn check(
        &self,
        keyring: &dyn Keyring,
        verify: Option<&VerifyCallback>,
    ) -> Option<Jid> {
        let (jid, fingerprint) = match &self.certificate {
            Certificate::OpenPgp(cert) => cert.identity()?,
            Certificate::X509(cert) => resolve_x509(cert, keyring).await?,
        };

        match verify {
            Some(callback) => callback.run(jid, fingerprint).await,
            None => Some(jid),
        }
    }
}

impl From<OpenPgpCertificate> for CertificateCredential {
    fn from(cert: OpenPgpCertificate) -> Self {
        Self::new(Certificate::OpenPgp(cert))
    }
}

impl From<X509Certificate> for CertificateCredential {
    fn from(cert: X509Certificate) -> Self {
        Self::new(Certificate::X509(cert))
    }
}

/// Walk certificate -> fingerprint -> key -> primary address -> user binding
async fn resolve_x509(cert: &X509Certificate, keyring: &dyn Keyring) -> Option<(Jid, Fingerprint)> {
    let Some(fingerprint) = step("resolve certificate", keyring.resolve_certificate(cert).await)
    else {
        debug!(subject = ?cert.subject(), "Certificate not known to the keyring");
        return None;
    };
    let key = step("look up key", keyring.get_key(&fingerprint).await)?;

    let Some(address) = key.primary_user_id().and_then(UserId::email) else {
        debug!(%fingerprint, "Key has no primary user address");
        return None;
    };
    let jid = match Jid::parse(address) {
        Ok(jid) => jid,
        Err(e) => {
            debug!(%fingerprint, error = %e, "Unusable key user id");
            return None;
        }
    };
    let Some(user) = jid.user() else {
        debug!(%fingerprint, %jid, "Key address has no user part");
        return None;
    };

    let bound = step("check user key", keyring.check_user_key(&key, user).await)?;
    Some((jid, bound))
}

/// Collapse a keyring answer into found / not found
fn step<T>(name: &str, result: AnyResult<Option<T>>) -> Option<T> {
    match result {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            debug!(step = name, "Certificate rejected by keyring");
            None
        }
        Err(e) => {
            debug!(step = name, error = %e, "Keyring error during certificate check");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keyring::{MemoryKeyring, PublicKey};
    use crate::auth::{Credential, CredentialChecker};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Keyring that answers from `inner` but errors in one chosen step
    struct FailingKeyring {
        inner: MemoryKeyring,
        failing: &'static str,
    }

    impl FailingKeyring {
        fn fail(&self, step: &str) -> AnyResult<()> {
            if self.failing == step {
                anyhow::bail!("keyring backend unavailable");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Keyring for FailingKeyring {
        async fn resolve_certificate(&self, cert: &X509Certificate) -> AnyResult<Option<Fingerprint>> {
            self.fail("resolve_certificate")?;
            self.inner.resolve_certificate(cert).await
        }

        async fn get_key(&self, fingerprint: &Fingerprint) -> AnyResult<Option<PublicKey>> {
            self.fail("get_key")?;
            self.inner.get_key(fingerprint).await
        }

        async fn check_user_key(&self, key: &PublicKey, user: &str) -> AnyResult<Option<Fingerprint>> {
            self.fail("check_user_key")?;
            self.inner.check_user_key(key, user).await
        }

        async fn validate_token(&self, token: &[u8]) -> AnyResult<Option<Jid>> {
            self.inner.validate_token(token).await
        }
    }

    fn fpr(byte: &str) -> Fingerprint {
        Fingerprint::parse(&byte.repeat(20)).unwrap()
    }

    fn x509_fixture() -> X509Certificate {
        let certified = rcgen::generate_simple_self_signed(vec!["alice.example.com".to_string()])
            .unwrap();
        X509Certificate::from_pem(&certified.cert.pem()).unwrap()
    }

    /// Keyring knowing alice's key and the certificate issued for it
    fn alice_keyring(cert: &X509Certificate) -> MemoryKeyring {
        let keyring = MemoryKeyring::new();
        keyring
            .add_key(PublicKey::new(
                fpr("AB"),
                vec![UserId::new("Alice <alice@example.com>")],
            ))
            .unwrap();
        keyring.add_certificate(cert, fpr("AB")).unwrap();
        keyring
    }

    #[tokio::test]
    async fn test_openpgp_primary_address() {
        let cert = OpenPgpCertificate::new(
            fpr("12"),
            vec![
                UserId::new("Alice <alice@example.com>"),
                UserId::new("Alice Work <alice@work.example>"),
            ],
        );
        let credential = CertificateCredential::from(cert);

        let jid = credential.check(&MemoryKeyring::new(), None).await.unwrap();
        assert_eq!(jid.to_string(), "alice@example.com");
        assert_eq!(jid.resource(), None);
    }

    #[tokio::test]
    async fn test_openpgp_without_address() {
        let cert = OpenPgpCertificate::new(fpr("12"), vec![UserId::new("Alice")]);
        let credential = CertificateCredential::from(cert);
        assert!(credential.check(&MemoryKeyring::new(), None).await.is_none());

        let cert = OpenPgpCertificate::new(fpr("12"), Vec::new());
        let credential = CertificateCredential::from(cert);
        assert!(credential.check(&MemoryKeyring::new(), None).await.is_none());
    }

    #[tokio::test]
    async fn test_x509_bound_key() {
        let cert = x509_fixture();
        let keyring = alice_keyring(&cert);
        keyring.bind_user("alice", fpr("AB")).unwrap();

        let credential = CertificateCredential::from(cert);
        let jid = credential.check(&keyring, None).await.unwrap();
        assert_eq!(jid.to_string(), "alice@example.com");
    }

    #[tokio::test]
    async fn test_x509_binding_mismatch() {
        let cert = x509_fixture();
        let keyring = alice_keyring(&cert);
        // alice is bound to a different key
        keyring.bind_user("alice", fpr("CD")).unwrap();

        let credential = CertificateCredential::from(cert);
        assert!(credential.check(&keyring, None).await.is_none());
    }

    #[tokio::test]
    async fn test_x509_unknown_certificate() {
        let keyring = alice_keyring(&x509_fixture());
        keyring.bind_user("alice", fpr("AB")).unwrap();

        let credential = CertificateCredential::from(x509_fixture());
        assert!(credential.check(&keyring, None).await.is_none());
    }

    #[tokio::test]
    async fn test_x509_missing_key() {
        let cert = x509_fixture();
        let keyring = MemoryKeyring::new();
        keyring.add_certificate(&cert, fpr("AB")).unwrap();
        keyring.bind_user("alice", fpr("AB")).unwrap();

        let credential = CertificateCredential::from(cert);
        assert!(credential.check(&keyring, None).await.is_none());
    }

    #[tokio::test]
    async fn test_x509_keyring_errors_reject() {
        for failing in ["resolve_certificate", "get_key", "check_user_key"] {
            let cert = x509_fixture();
            let inner = alice_keyring(&cert);
            inner.bind_user("alice", fpr("AB")).unwrap();
            let keyring = FailingKeyring { inner, failing };

            let credential = CertificateCredential::from(cert);
            assert!(
                credential.check(&keyring, None).await.is_none(),
                "error in {} accepted",
                failing
            );

            let checker = CredentialChecker::new(fpr("0F"), Arc::new(keyring));
            assert!(
                matches!(
                    checker.authenticate(&Credential::from(credential)).await,
                    Err(Error::Unauthorized)
                ),
                "error in {} authenticated",
                failing
            );
        }
    }

    #[tokio::test]
    async fn test_verify_callback_overrides() {
        let cert = OpenPgpCertificate::new(fpr("12"), vec![UserId::new("<alice@example.com>")]);
        let credential = CertificateCredential::from(cert);

        let reject = VerifyCallback::from_fn(|_jid, _fpr| async { None });
        assert!(credential.check(&MemoryKeyring::new(), Some(&reject)).await.is_none());

        let rewrite = VerifyCallback::from_fn(|jid: Jid, fingerprint: Fingerprint| async move {
            assert_eq!(fingerprint, fpr("12"));
            Jid::new(jid.user(), jid.host(), Some("cached")).ok()
        });
        let jid = credential
            .check(&MemoryKeyring::new(), Some(&rewrite))
            .await
            .unwrap();
        assert_eq!(jid.to_string(), "alice@example.com/cached");
    }

    #[tokio::test]
    async fn test_verify_callback_receives_bound_fingerprint() {
        let cert = x509_fixture();
        let keyring = alice_keyring(&cert);
        keyring.bind_user("alice", fpr("AB")).unwrap();

        let callback = VerifyCallback::from_fn(|jid: Jid, fingerprint: Fingerprint| async move {
            (fingerprint == fpr("AB")).then_some(jid)
        });
        let credential = CertificateCredential::from(cert);
        assert!(credential.check(&keyring, Some(&callback)).await.is_some());
    }

    #[test]
    fn test_x509_parsing() {
        let cert = x509_fixture();
        assert!(cert.subject().is_some());
        assert_eq!(cert.digest().len(), 64);

        assert!(X509Certificate::from_der(b"not a certificate".to_vec()).is_err());
        assert!(X509Certificate::from_pem("garbage").is_err());
    }
}
