//! Persona identities and identity selection.
//!
//! A persona is the user's long-term P-256 keypair. It is owned by the host
//! application; this crate only reads it, to derive credential ids, wrap keys
//! and binding proofs.

use async_trait::async_trait;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::credential_id::CredentialId;
use crate::error::{KeywrapError, Result};
use crate::rp::RelyingPartyId;

/// Domain separation tag for binding proofs.
const BINDING_PROOF_TAG: &[u8] = b"keywrap/binding/v1";

/// A user's long-term identity keypair.
#[derive(Clone)]
pub struct Persona {
    secret: SecretKey,
    public: PublicKey,
    nickname: Option<String>,
}

impl Persona {
    /// Generate a fresh persona. Hosts normally load personas instead.
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self {
            secret,
            public,
            nickname: None,
        }
    }

    /// Build a persona from a secret key, deriving the public half.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            secret,
            public,
            nickname: None,
        }
    }

    /// Build a persona from separately stored halves.
    ///
    /// Fails with `InputError` when the public key does not belong to the secret.
    pub fn from_parts(secret: SecretKey, public: PublicKey) -> Result<Self> {
        if secret.public_key() != public {
            return Err(KeywrapError::InputError(
                "persona public key does not match its private key".into(),
            ));
        }
        Ok(Self {
            secret,
            public,
            nickname: None,
        })
    }

    /// Import a persona from a private EC JSON Web Key.
    pub fn from_jwk(jwk: &str) -> Result<Self> {
        let secret = SecretKey::from_jwk_str(jwk)
            .map_err(|e| KeywrapError::SerializationError(format!("invalid persona JWK: {e}")))?;
        Ok(Self::from_secret(secret))
    }

    /// Export the persona as a private EC JSON Web Key.
    pub fn to_jwk(&self) -> Zeroizing<String> {
        self.secret.to_jwk_string()
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Compressed SEC1 encoding of the public key (33 bytes).
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.public.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Sign a binding of `credential_id` under this persona for `rp_id`.
    pub fn prove_binding(&self, rp_id: &RelyingPartyId, credential_id: &CredentialId) -> BindingProof {
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key.sign(&binding_message(rp_id, credential_id));
        BindingProof(signature.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persona")
            .field("public_key", &hex::encode(self.public_key_sec1()))
            .field("nickname", &self.nickname)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Proof that a persona authorized binding a credential id under its namespace.
///
/// A deterministic ECDSA P-256 signature (r || s) over the relying-party id and
/// the credential id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingProof(#[serde(with = "hex::serde")] Vec<u8>);

impl BindingProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check the proof against the persona public key that owns the namespace.
    pub fn verify(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
        credential_id: &CredentialId,
    ) -> bool {
        let Ok(signature) = Signature::from_slice(&self.0) else {
            return false;
        };
        VerifyingKey::from(persona_public)
            .verify(&binding_message(rp_id, credential_id), &signature)
            .is_ok()
    }
}

fn binding_message(rp_id: &RelyingPartyId, credential_id: &CredentialId) -> Vec<u8> {
    let rp = rp_id.as_str().as_bytes();
    let mut message = Vec::with_capacity(BINDING_PROOF_TAG.len() + 4 + rp.len() + 32);
    message.extend_from_slice(BINDING_PROOF_TAG);
    message.extend_from_slice(&(rp.len() as u32).to_be_bytes());
    message.extend_from_slice(rp);
    message.extend_from_slice(credential_id.as_bytes());
    message
}

/// Supplies the persona an authenticator operation runs as.
///
/// The host usually shows a picker; the relying-party id is passed so the
/// picker can say which site is asking.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn select_identity(&self, rp_id: &RelyingPartyId) -> Result<Persona>;
}

/// Always selects the first of a fixed list of personas.
#[derive(Debug, Clone, Default)]
pub struct FirstPersona {
    personas: Vec<Persona>,
}

impl FirstPersona {
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    pub fn single(persona: Persona) -> Self {
        Self::new(vec![persona])
    }
}

#[async_trait]
impl IdentitySource for FirstPersona {
    async fn select_identity(&self, _rp_id: &RelyingPartyId) -> Result<Persona> {
        self.personas
            .first()
            .cloned()
            .ok_or_else(|| KeywrapError::InputError("no persona available".into()))
    }
}

/// Adapts a selection callback into an [`IdentitySource`].
///
/// The callback returns `None` when the user dismisses the picker.
pub struct SelectWith<F>(pub F);

#[async_trait]
impl<F> IdentitySource for SelectWith<F>
where
    F: Fn(&RelyingPartyId) -> Option<Persona> + Send + Sync,
{
    async fn select_identity(&self, rp_id: &RelyingPartyId) -> Result<Persona> {
        (self.0)(rp_id).ok_or_else(|| {
            KeywrapError::InputError(format!("no persona selected for {rp_id}"))
        })
    }
}
