use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use super::keyring::Keyring;
use crate::error::{Error, Result};
use crate::identity::Jid;

/// Credential backed by an opaque, pre-issued token
#[derive(Clone, PartialEq, Eq)]
pub struct TokenCredential {
    token: Vec<u8>,
    decode_base64: bool,
}

impl TokenCredential {
    pub fn new(token: impl Into<Vec<u8>>, decode_base64: bool) -> Self {
        Self {
            token: token.into(),
            decode_base64,
        }
    }

    /// Token bytes as received
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Whether the token must be base64-decoded before validation
    pub fn decode_base64(&self) -> bool {
        self.decode_base64
    }

    /// Validate against the keyring. Malformed tokens and keyring errors are
    /// logged and reported as no identity.
    pub(crate) async fn check(&self, keyring: &dyn Keyring) -> Option<Jid> {
        let data = if self.decode_base64 {
            match STANDARD.decode(&self.token) {
                Ok(decoded) => Cow::Owned(decoded),
                Err(e) => {
                    warn!(error = %e, "Token verification failed: invalid base64");
                    return None;
                }
            }
        } else {
            Cow::Borrowed(self.token.as_slice())
        };

        match keyring.validate_token(&data).await {
            Ok(Some(jid)) => Some(jid),
            Ok(None) => {
                debug!("Token not recognized by keyring");
                None
            }
            Err(e) => {
                warn!(error = %e, "Token verification failed");
                None
            }
        }
    }
}

impl fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredential")
            .field("token", &format_args!("<{} bytes>", self.token.len()))
            .field("decode_base64", &self.decode_base64)
            .finish()
    }
}

/// HTTP challenge/response adapter for the token scheme
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenChallenge;

impl TokenChallenge {
    /// Authentication scheme name on the wire
    pub const SCHEME: &'static str = "kontalktoken";

    /// Key carrying the token in a challenge response
    pub const RESPONSE_KEY: &'static str = "auth";

    /// The scheme needs no server nonce, so the challenge is always empty
    pub fn issue_challenge(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Decode an `auth=<base64 token>` response
    pub fn decode_response(&self, response: &str) -> Result<TokenCredential> {
        match response.split_once('=') {
            Some((key, value)) if key == Self::RESPONSE_KEY => {
                Ok(TokenCredential::new(value.as_bytes(), true))
            }
            Some((key, _)) => Err(Error::MalformedChallengeResponse(format!(
                "unexpected key {:?}",
                key
            ))),
            None => Err(Error::MalformedChallengeResponse(
                "missing key=value pair".to_string(),
            )),
        }
    }
}
