use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of hex characters in a key or node fingerprint
pub const FINGERPRINT_LEN: usize = 40;

/// Uppercase hex fingerprint of a public key or a federation node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse and canonicalize a fingerprint.
    ///
    /// Whitespace (as in the grouped `ABCD 1234 ...` display form) is ignored;
    /// the remaining characters must be exactly 40 hex digits.
    pub fn parse(input: &str) -> Result<Self> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();

        if compact.len() != FINGERPRINT_LEN || !compact.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidFingerprint(input.to_string()));
        }

        Ok(Self(compact.to_ascii_uppercase()))
    }

    /// All-zero fingerprint written into freshly generated configs
    pub(crate) fn placeholder() -> Self {
        Self("0".repeat(FINGERPRINT_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fpr: Fingerprint) -> Self {
        fpr.0
    }
}
