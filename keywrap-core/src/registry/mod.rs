//! Credential registry client.
//!
//! The registry is an external, eventually-consistent key/value store holding
//! three kinds of entries:
//!
//! - **bindings**: `(persona, rp id) -> [credential id]`
//! - **wrapped keys**: `credential id -> [IV || ciphertext]` (list-append)
//! - **sign counters**: `credential id -> u32`
//!
//! There is no read-your-writes guarantee and no multi-key transaction.
//! Callers must tolerate stale reads and duplicate entries.
//!
//! ## Implementations
//!
//! - [`MemoryRegistry`] - in-process store for tests and local use
//! - [`RetryingRegistry`] - exponential-backoff decorator over any registry

mod memory;
#[cfg(feature = "retry")]
mod retry;

pub use memory::{
    BindingEntry, CounterEntry, KeyEntry, MemoryRegistry, RegistrySnapshot, RegistryStats,
};
#[cfg(feature = "retry")]
pub use retry::{RetryConfig, RetryingRegistry};

use async_trait::async_trait;
use p256::PublicKey;

use crate::credential_id::CredentialId;
use crate::error::Result;
use crate::keywrap::{WrapProof, WrappedKeyRecord};
use crate::persona::BindingProof;
use crate::rp::RelyingPartyId;

/// Client for the credential registry.
///
/// Implementations must be thread-safe (`Send + Sync`). Transport failures are
/// reported as `RegistryUnavailable`; refusals as `RegistryRejected`.
#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Bind `credential_id` under the `(persona, rp_id)` namespace.
    async fn publish_credential(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
        credential_id: &CredentialId,
        proof: &BindingProof,
    ) -> Result<()>;

    /// Append a wrapped key record for `credential_id`.
    async fn publish_key(
        &self,
        credential_id: &CredentialId,
        proof: &WrapProof,
        record: &WrappedKeyRecord,
    ) -> Result<()>;

    /// Credential ids bound under `(persona, rp_id)`, possibly empty.
    async fn search_credentials(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
    ) -> Result<Vec<CredentialId>>;

    /// Candidate wrapped key records for `credential_id`, possibly empty.
    async fn search_keys(&self, credential_id: &CredentialId) -> Result<Vec<WrappedKeyRecord>>;

    async fn get_sign_count(&self, credential_id: &CredentialId) -> Result<u32>;

    /// Atomically increment and return the new counter value.
    async fn increment_sign_count(&self, credential_id: &CredentialId) -> Result<u32>;
}
