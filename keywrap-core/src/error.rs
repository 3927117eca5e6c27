use thiserror::Error;

/// Length in bytes of a credential identifier (SHA-256 digest).
pub const CREDENTIAL_ID_BYTES: usize = 32;

/// Length in bytes of the initialization vector prefixed to every wrapped key record.
pub const WRAP_IV_LEN: usize = 16;

/// Length in bytes of the AES-GCM authentication tag at the end of a wrapped key record.
pub const WRAP_TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum KeywrapError {
    #[error("Input error: {0}")]
    InputError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Derivation error: {0}")]
    DerivationError(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Registry entry not found: {0}")]
    NotFound(String),

    #[error("Registry rejected request: {0}")]
    RegistryRejected(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("No stored credential could be unwrapped for relying party {rp_id}")]
    CredentialNotFound { rp_id: String },

    #[error("Credential {credential_id} is already registered for relying party {rp_id}")]
    CredentialAlreadyExists {
        rp_id: String,
        credential_id: String,
    },
}

impl KeywrapError {
    /// Whether a caller may retry the failed operation after a backoff.
    ///
    /// Only registry transport failures qualify. Derivation and input errors
    /// indicate misconfiguration and repeat deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RegistryUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, KeywrapError>;
