//! Self-agreement key wrapping.
//!
//! The wrap key is `HKDF-SHA256(ECDH(persona secret, persona public))`: the
//! persona agrees a key with itself, so the same persona always recovers the
//! same wrap key and nothing has to be stored. Authenticator private keys are
//! sealed under it with AES-256-GCM using a 16-byte IV.
//!
//! Record framing (fixed, never inferred from decryption success):
//!
//! ```text
//! [0 .. 16)   IV
//! [16 .. )    ciphertext || 16-byte tag
//! ```

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::credential_id::CredentialId;
use crate::error::{KeywrapError, Result, WRAP_IV_LEN, WRAP_TAG_LEN};

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

const WRAP_KEY_SALT: &[u8] = b"keywrap/self-agreement/v1";
const WRAP_KEY_INFO: &[u8] = b"keywrap/wrap-key/aes-256-gcm";
const WRAP_PROOF_TAG: &[u8] = b"keywrap/wrap-proof/v1";

/// 256-bit symmetric key protecting authenticator private keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct WrapKey([u8; 32]);

impl WrapKey {
    /// Derive the wrap key for a persona from its own keypair.
    pub fn derive(persona_secret: &SecretKey, persona_public: &PublicKey) -> Result<Self> {
        let shared =
            p256::ecdh::diffie_hellman(persona_secret.to_nonzero_scalar(), persona_public.as_affine());

        let hk = Hkdf::<Sha256>::new(Some(WRAP_KEY_SALT), &shared.raw_secret_bytes()[..]);
        let mut okm = [0u8; 32];
        hk.expand(WRAP_KEY_INFO, &mut okm)
            .map_err(|e| KeywrapError::DerivationError(format!("HKDF expand failed: {e}")))?;

        Ok(Self(okm))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm16> {
        Aes256Gcm16::new_from_slice(&self.0)
            .map_err(|e| KeywrapError::CryptoError(format!("invalid wrap key: {e}")))
    }
}

impl std::fmt::Debug for WrapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WrapKey([REDACTED])")
    }
}

/// `IV || ciphertext+tag` as stored in the registry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord(#[serde(with = "hex::serde")] Vec<u8>);

impl WrappedKeyRecord {
    /// Frame an IV and an authenticated ciphertext.
    pub fn new(iv: [u8; WRAP_IV_LEN], ciphertext: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(WRAP_IV_LEN + ciphertext.len());
        bytes.extend_from_slice(&iv);
        bytes.extend_from_slice(ciphertext);
        Self(bytes)
    }

    /// Wrap raw bytes read back from a registry. Framing is checked on [`unwrap`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split at exactly [`WRAP_IV_LEN`] into `(iv, ciphertext+tag)`.
    pub fn split(&self) -> Result<(&[u8], &[u8])> {
        if self.0.len() < WRAP_IV_LEN + WRAP_TAG_LEN {
            return Err(KeywrapError::CryptoError(format!(
                "wrapped key record too short: {} bytes",
                self.0.len()
            )));
        }
        Ok(self.0.split_at(WRAP_IV_LEN))
    }

    pub fn iv(&self) -> Result<&[u8]> {
        self.split().map(|(iv, _)| iv)
    }

    pub fn ciphertext(&self) -> Result<&[u8]> {
        self.split().map(|(_, ciphertext)| ciphertext)
    }
}

impl std::fmt::Debug for WrappedKeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKeyRecord")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Seal `plaintext` under `key` with a freshly sampled IV.
pub fn wrap(key: &WrapKey, plaintext: &[u8]) -> Result<WrappedKeyRecord> {
    let mut iv = [0u8; WRAP_IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = key
        .cipher()?
        .encrypt(&Nonce::<U16>::from(iv), plaintext)
        .map_err(|e| KeywrapError::CryptoError(format!("encryption failed: {e}")))?;

    Ok(WrappedKeyRecord::new(iv, &ciphertext))
}

/// Open a record sealed by [`wrap`].
///
/// Wrong key, tampering and truncated records all fail with `CryptoError`.
pub fn unwrap(key: &WrapKey, record: &WrappedKeyRecord) -> Result<Zeroizing<Vec<u8>>> {
    let (iv, ciphertext) = record.split()?;
    let iv: [u8; WRAP_IV_LEN] = iv
        .try_into()
        .map_err(|_| KeywrapError::CryptoError("malformed IV".into()))?;

    let plaintext = key
        .cipher()?
        .decrypt(&Nonce::<U16>::from(iv), ciphertext)
        .map_err(|_| KeywrapError::CryptoError("authentication tag mismatch".into()))?;

    Ok(Zeroizing::new(plaintext))
}

/// Fingerprint of one record under one wrap key.
///
/// Registries use it to recognise a re-published record, so a retried
/// `publish_key` does not append a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WrapProof(#[serde(with = "hex::serde")] [u8; 32]);

impl WrapProof {
    pub fn compute(key: &WrapKey, credential_id: &CredentialId, record: &WrappedKeyRecord) -> Result<Self> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.as_bytes())
            .map_err(|e| KeywrapError::DerivationError(format!("HMAC key rejected: {e}")))?;
        mac.update(WRAP_PROOF_TAG);
        mac.update(credential_id.as_bytes());
        mac.update(record.as_bytes());

        let tag = mac.finalize().into_bytes();
        let mut proof = [0u8; 32];
        proof.copy_from_slice(&tag);
        Ok(Self(proof))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
