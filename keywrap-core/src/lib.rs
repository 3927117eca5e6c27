//! Keywrap Core - stateless deterministic WebAuthn authenticator
//!
//! Resident credentials are rebuilt on demand from the user's long-term
//! identity keypair (the *persona*) instead of being kept in device storage.
//! A stable credential id and a symmetric wrap key are derived from the
//! persona alone; the wrap key protects per-credential private keys stored in
//! an external, eventually-consistent registry.
//!
//! # Features
//!
//! - Credential ids: `SHA-256(persona scalar || rp id)`
//! - Wrap key: `HKDF-SHA256(ECDH(persona secret, persona public))`
//! - AES-256-GCM wrapped key records with a fixed `IV || ciphertext` layout
//! - Registry client trait with an in-memory store and a retry decorator
//! - Secrets zeroized on drop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keywrap_core::{AuthenticatorAdapter, FirstPersona, MemoryRegistry, Persona};
//!
//! # async fn example() -> keywrap_core::Result<()> {
//! let registry = Arc::new(MemoryRegistry::new());
//! let identity = Arc::new(FirstPersona::single(Persona::generate()));
//! let adapter = AuthenticatorAdapter::new(registry, identity);
//!
//! let (created, credential_id) = adapter
//!     .create_key_pair_by_key_wrap("example.com", &[])
//!     .await?;
//!
//! let (recovered, _) = adapter
//!     .get_key_pair_by_key_wrap("example.com", &[credential_id])
//!     .await?;
//! assert_eq!(created, recovered);
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod config;
pub mod credential_id;
pub mod error;
pub mod keywrap;
pub mod persona;
pub mod registry;
pub mod rp;

// Re-export main types for convenience
pub use authenticator::{AuthenticatorAdapter, AuthenticatorKeyPair, Phase};
pub use config::{AuthenticatorConfig, CredentialIdBinding, DEFAULT_MAX_UNWRAP_ATTEMPTS};
pub use credential_id::{derive_credential_id, CredentialId};
pub use error::{KeywrapError, Result, CREDENTIAL_ID_BYTES, WRAP_IV_LEN, WRAP_TAG_LEN};
pub use keywrap::{unwrap, wrap, WrapKey, WrapProof, WrappedKeyRecord};
pub use persona::{BindingProof, FirstPersona, IdentitySource, Persona, SelectWith};
pub use registry::{CredentialRegistry, MemoryRegistry, RegistrySnapshot, RegistryStats};
pub use rp::RelyingPartyId;

#[cfg(feature = "retry")]
pub use registry::{RetryConfig, RetryingRegistry};

// Key types callers need to build personas by hand.
pub use p256::{PublicKey, SecretKey};
