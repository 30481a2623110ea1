pub mod certificate;
pub mod checker;
pub mod keyring;
pub mod token;
pub mod verify;

pub use certificate::{Certificate, CertificateCredential, OpenPgpCertificate, X509Certificate};
pub use checker::CredentialChecker;
pub use keyring::{Keyring, MemoryKeyring, PublicKey, UserId};
pub use token::{TokenChallenge, TokenCredential};
pub use verify::{FingerprintVerifier, VerifyCallback};

use tracing::instrument;

use crate::identity::{Fingerprint, Jid};

/// Credential presented by a client, built per request from wire data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Certificate(CertificateCredential),
    Token(TokenCredential),
}

impl Credential {
    /// Short name of the credential kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Certificate(cred) => match cred.certificate() {
                Certificate::OpenPgp(_) => "openpgp",
                Certificate::X509(_) => "x509",
            },
            Credential::Token(_) => "token",
        }
    }

    /// Resolve the credential to an identity.
    ///
    /// Never fails: every rejection and internal error comes back as `None`.
    /// The verification callback only applies to certificates.
    #[instrument(level = "debug", skip_all, fields(node = %fingerprint, kind = self.kind()))]
    pub async fn check(
        &self,
        fingerprint: &Fingerprint,
        keyring: &dyn Keyring,
        verify: Option<&VerifyCallback>,
    ) -> Option<Jid> {
        match self {
            Credential::Certificate(cred) => cred.check(keyring, verify).await,
            Credential::Token(cred) => cred.check(keyring).await,
        }
    }
}

impl From<CertificateCredential> for Credential {
    fn from(cred: CertificateCredential) -> Self {
        Credential::Certificate(cred)
    }
}

impl From<TokenCredential> for Credential {
    fn from(cred: TokenCredential) -> Self {
        Credential::Token(cred)
    }
}
