use std::fmt::{Display, Formatter};

use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

pub type HmacSha256 = Hmac<Sha256>;

/// An opaque identity token produced by the external authentication
/// ceremony (wallet address, credential id, device fingerprint, ...).
///
/// The only guarantees relied upon are that it is unique per person and
/// reproducible by that person on later requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Wrap a raw token, trimming surrounding whitespace.
    /// Empty tokens are rejected.
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::bad_request("Identity must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wallet addresses are case-insensitive, so identities are matched
    /// ignoring ASCII case when checking for the admin.
    pub fn matches(&self, other: &Identity) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The key a voter is stored under: a keyed hash of their identity token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterKey(String);

impl VoterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VoterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives voter keys from identity tokens.
///
/// Potentially sensitive tokens (device fingerprints, credential ids) are
/// never stored directly; only their HMAC is.
#[derive(Clone)]
pub struct IdentityIssuer {
    secret: Vec<u8>,
}

impl IdentityIssuer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Compute the voter key for the given identity.
    pub fn voter_key(&self, identity: &Identity) -> VoterKey {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret).unwrap();
        mac.update(identity.as_str().as_bytes());
        VoterKey(HEXLOWER.encode(&mac.finalize().into_bytes()))
    }
}
