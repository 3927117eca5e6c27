//! Deterministic credential identifiers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use p256::SecretKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{KeywrapError, Result, CREDENTIAL_ID_BYTES};
use crate::rp::RelyingPartyId;

/// Opaque 32-byte credential identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialId(#[serde(with = "hex::serde")] [u8; CREDENTIAL_ID_BYTES]);

impl CredentialId {
    pub const fn from_bytes(bytes: [u8; CREDENTIAL_ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse an id received from a relying party; must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; CREDENTIAL_ID_BYTES] = bytes.try_into().map_err(|_| {
            KeywrapError::InputError(format!(
                "credential id must be {CREDENTIAL_ID_BYTES} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn from_base64url(encoded: &str) -> Result<Self> {
        let bytes = BASE64URL
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| KeywrapError::InputError(format!("invalid base64url credential id: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)
            .map_err(|e| KeywrapError::InputError(format!("invalid hex credential id: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CREDENTIAL_ID_BYTES] {
        &self.0
    }

    /// WebAuthn transport encoding.
    pub fn to_base64url(&self) -> String {
        BASE64URL.encode(self.0)
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialId({})", hex::encode(self.0))
    }
}

/// Derive the credential id for a key under a relying party.
///
/// `SHA-256(secret scalar (32 bytes, big-endian) || UTF-8 rp id)`.
pub fn derive_credential_id(secret: &SecretKey, rp_id: &RelyingPartyId) -> CredentialId {
    let mut scalar = secret.to_bytes();

    let mut hasher = Sha256::new();
    hasher.update(&scalar[..]);
    hasher.update(rp_id.as_str().as_bytes());
    scalar[..].zeroize();

    let digest = hasher.finalize();
    let mut id = [0u8; CREDENTIAL_ID_BYTES];
    id.copy_from_slice(&digest);
    CredentialId(id)
}
