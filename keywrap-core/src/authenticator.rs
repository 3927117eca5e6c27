//! Stateless authenticator backed by the credential registry.
//!
//! Every operation runs the same short pipeline:
//!
//! ```text
//! SelectIdentity -> DeriveMaterial -> Lookup | Create -> Done | Failed
//! ```
//!
//! Nothing is kept between calls. The credential id and the wrap key are
//! recomputed from the selected persona each time, and authenticator private
//! keys only ever leave the process wrapped.

use std::collections::HashSet;
use std::sync::Arc;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::config::{AuthenticatorConfig, CredentialIdBinding};
use crate::credential_id::{derive_credential_id, CredentialId};
use crate::error::{KeywrapError, Result};
use crate::keywrap::{unwrap, wrap, WrapKey, WrapProof, WrappedKeyRecord};
use crate::persona::{IdentitySource, Persona};
use crate::registry::CredentialRegistry;
use crate::rp::RelyingPartyId;

/// Pipeline stage, recorded as the `phase` field of tracing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SelectIdentity,
    DeriveMaterial,
    Lookup,
    Create,
    Done,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SelectIdentity => "select_identity",
            Self::DeriveMaterial => "derive_material",
            Self::Lookup => "lookup",
            Self::Create => "create",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// P-256 keypair minted for a single credential.
#[derive(Clone)]
pub struct AuthenticatorKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl AuthenticatorKeyPair {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Rebuild a keypair from a 32-byte big-endian scalar.
    ///
    /// Anything else (wrong length, zero, out of range) is `CryptoError`.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(KeywrapError::CryptoError(format!(
                "expected a 32-byte scalar, got {} bytes",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| KeywrapError::CryptoError("plaintext is not a P-256 scalar".into()))?;
        Ok(Self::from_secret(secret))
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

    /// The big-endian secret scalar, the plaintext that gets wrapped.
    pub fn secret_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut scalar = self.secret.to_bytes();
        let bytes = Zeroizing::new(scalar.to_vec());
        scalar[..].zeroize();
        bytes
    }
}

impl PartialEq for AuthenticatorKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && *self.secret_bytes() == *other.secret_bytes()
    }
}

impl Eq for AuthenticatorKeyPair {}

impl std::fmt::Debug for AuthenticatorKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorKeyPair")
            .field("public_key", &hex::encode(self.public_key_sec1()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Material recomputed at the start of every operation.
struct Derived {
    rp_id: RelyingPartyId,
    persona: Persona,
    wrap_key: WrapKey,
}

/// Authenticator that reconstructs credentials from the persona on demand.
///
/// Holds only shared handles and an immutable config, so one adapter can
/// serve any number of concurrent operations.
#[derive(Clone)]
pub struct AuthenticatorAdapter {
    registry: Arc<dyn CredentialRegistry>,
    identity: Arc<dyn IdentitySource>,
    config: AuthenticatorConfig,
}

impl AuthenticatorAdapter {
    pub fn new(registry: Arc<dyn CredentialRegistry>, identity: Arc<dyn IdentitySource>) -> Self {
        Self::with_config(registry, identity, AuthenticatorConfig::default())
    }

    pub fn with_config(
        registry: Arc<dyn CredentialRegistry>,
        identity: Arc<dyn IdentitySource>,
        config: AuthenticatorConfig,
    ) -> Self {
        Self {
            registry,
            identity,
            config,
        }
    }

    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    #[instrument(skip(self))]
    pub async fn get_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        self.registry.get_sign_count(credential_id).await
    }

    #[instrument(skip(self))]
    pub async fn increment_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        let count = self.registry.increment_sign_count(credential_id).await?;
        debug!(credential_id = %credential_id, count, "Sign counter advanced");
        Ok(count)
    }

    /// The resident credential for `rp_id`: the persona's own keypair under
    /// the persona-derived credential id.
    #[instrument(skip(self))]
    pub async fn get_resident_key_pair(
        &self,
        rp_id: &str,
    ) -> Result<(AuthenticatorKeyPair, CredentialId)> {
        let rp_id = RelyingPartyId::parse(rp_id)?;
        let persona = self.select_identity(&rp_id).await?;

        let credential_id = derive_credential_id(persona.secret_key(), &rp_id);
        let key_pair = AuthenticatorKeyPair::from_secret(persona.secret_key().clone());

        info!(phase = %Phase::Done, credential_id = %credential_id, "Resident key pair ready");
        Ok((key_pair, credential_id))
    }

    /// Recover the keypair for one of `candidates` from the registry.
    ///
    /// Only candidates bound under the selected persona for `rp_id` are tried,
    /// in registry order. Records that fail to decrypt are skipped, up to
    /// `max_unwrap_attempts` in total.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn get_key_pair_by_key_wrap(
        &self,
        rp_id: &str,
        candidates: &[CredentialId],
    ) -> Result<(AuthenticatorKeyPair, CredentialId)> {
        let derived = self.derive(rp_id).await?;

        debug!(phase = %Phase::Lookup, "Searching bound credentials");
        let bound = self
            .registry
            .search_credentials(derived.persona.public_key(), &derived.rp_id)
            .await?;

        let wanted: HashSet<&CredentialId> = candidates.iter().collect();
        let mut seen = HashSet::new();
        let matching: Vec<CredentialId> = bound
            .into_iter()
            .filter(|id| wanted.contains(id) && seen.insert(*id))
            .collect();

        if matching.is_empty() {
            info!(phase = %Phase::Failed, "No candidate is bound to this persona");
            return Err(KeywrapError::CredentialNotFound {
                rp_id: derived.rp_id.to_string(),
            });
        }

        // One budget shared by every record of every candidate.
        let cap = self.config.max_unwrap_attempts;
        let mut attempts = 0usize;

        for credential_id in &matching {
            if attempts >= cap {
                return Err(self.attempts_exhausted(credential_id));
            }

            let records = self.fetch_records(credential_id).await?;
            if records.is_empty() {
                attempts += 1;
                continue;
            }

            for (index, record) in records.iter().enumerate() {
                if attempts >= cap {
                    return Err(self.attempts_exhausted(credential_id));
                }
                attempts += 1;

                if let Some(key_pair) = try_unwrap(&derived.wrap_key, credential_id, index, record) {
                    info!(
                        phase = %Phase::Done,
                        credential_id = %credential_id,
                        attempts,
                        "Key pair unwrapped"
                    );
                    return Ok((key_pair, *credential_id));
                }
            }
        }

        info!(
            phase = %Phase::Failed,
            tried = matching.len(),
            attempts,
            "No candidate record could be unwrapped"
        );
        Err(KeywrapError::CredentialNotFound {
            rp_id: derived.rp_id.to_string(),
        })
    }

    /// Mint a keypair for `rp_id`, bind its credential id under the persona
    /// and publish the wrapped private key.
    ///
    /// Fails with `CredentialAlreadyExists`, before any registry write, when a
    /// credential bound under the persona appears in `exclude`.
    #[instrument(skip(self, exclude), fields(exclude = exclude.len()))]
    pub async fn create_key_pair_by_key_wrap(
        &self,
        rp_id: &str,
        exclude: &[CredentialId],
    ) -> Result<(AuthenticatorKeyPair, CredentialId)> {
        let derived = self.derive(rp_id).await?;

        debug!(phase = %Phase::Lookup, "Checking exclusion list");
        let bound = self
            .registry
            .search_credentials(derived.persona.public_key(), &derived.rp_id)
            .await?;

        if let Some(hit) = bound.iter().find(|id| exclude.contains(id)) {
            return Err(already_exists(&derived.rp_id, hit));
        }
        if self.config.credential_id_binding == CredentialIdBinding::Persona {
            // The id is known up front; a stale registry read must not hide it.
            let own = derive_credential_id(derived.persona.secret_key(), &derived.rp_id);
            if exclude.contains(&own) {
                return Err(already_exists(&derived.rp_id, &own));
            }
        }

        let key_pair = AuthenticatorKeyPair::generate();
        let credential_id = match self.config.credential_id_binding {
            CredentialIdBinding::Persona => {
                derive_credential_id(derived.persona.secret_key(), &derived.rp_id)
            }
            CredentialIdBinding::KeyPair => {
                derive_credential_id(key_pair.secret_key(), &derived.rp_id)
            }
        };

        debug!(
            phase = %Phase::Create,
            credential_id = %credential_id,
            binding = %self.config.credential_id_binding,
            "Wrapping new key pair"
        );
        let record = wrap(&derived.wrap_key, &key_pair.secret_bytes())?;
        let wrap_proof = WrapProof::compute(&derived.wrap_key, &credential_id, &record)?;
        let binding_proof = derived.persona.prove_binding(&derived.rp_id, &credential_id);

        self.registry
            .publish_credential(
                derived.persona.public_key(),
                &derived.rp_id,
                &credential_id,
                &binding_proof,
            )
            .await?;
        self.registry
            .publish_key(&credential_id, &wrap_proof, &record)
            .await?;

        info!(
            phase = %Phase::Done,
            credential_id = %credential_id,
            record_len = record.len(),
            "Credential created"
        );
        Ok((key_pair, credential_id))
    }

    async fn select_identity(&self, rp_id: &RelyingPartyId) -> Result<Persona> {
        debug!(phase = %Phase::SelectIdentity, rp_id = %rp_id, "Selecting identity");
        let persona = self.identity.select_identity(rp_id).await?;
        debug!(
            phase = %Phase::SelectIdentity,
            persona = %hex::encode(persona.public_key_sec1()),
            nickname = persona.nickname(),
            "Identity selected"
        );
        Ok(persona)
    }

    async fn derive(&self, rp_id: &str) -> Result<Derived> {
        let rp_id = RelyingPartyId::parse(rp_id)?;
        let persona = self.select_identity(&rp_id).await?;

        debug!(phase = %Phase::DeriveMaterial, "Deriving wrap key");
        let wrap_key = WrapKey::derive(persona.secret_key(), persona.public_key())?;

        Ok(Derived {
            rp_id,
            persona,
            wrap_key,
        })
    }

    async fn fetch_records(&self, credential_id: &CredentialId) -> Result<Vec<WrappedKeyRecord>> {
        match self.registry.search_keys(credential_id).await {
            Ok(records) => Ok(records),
            Err(KeywrapError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn attempts_exhausted(&self, next: &CredentialId) -> KeywrapError {
        warn!(
            phase = %Phase::Failed,
            max_unwrap_attempts = self.config.max_unwrap_attempts,
            next_credential_id = %next,
            "Unwrap attempt limit reached"
        );
        KeywrapError::RegistryUnavailable(format!(
            "gave up after {} unwrap attempts",
            self.config.max_unwrap_attempts
        ))
    }
}

impl std::fmt::Debug for AuthenticatorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatorAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The keypair in `record`, if it decrypts to a valid scalar.
fn try_unwrap(
    wrap_key: &WrapKey,
    credential_id: &CredentialId,
    index: usize,
    record: &WrappedKeyRecord,
) -> Option<AuthenticatorKeyPair> {
    let unwrapped = unwrap(wrap_key, record)
        .and_then(|plaintext| AuthenticatorKeyPair::from_secret_bytes(&plaintext));
    match unwrapped {
        Ok(key_pair) => Some(key_pair),
        Err(e) => {
            debug!(
                credential_id = %credential_id,
                record = index,
                error = %e,
                "Skipping record"
            );
            None
        }
    }
}

fn already_exists(rp_id: &RelyingPartyId, credential_id: &CredentialId) -> KeywrapError {
    info!(phase = %Phase::Failed, credential_id = %credential_id, "Excluded credential already bound");
    KeywrapError::CredentialAlreadyExists {
        rp_id: rp_id.to_string(),
        credential_id: credential_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{BindingProof, FirstPersona, SelectWith};
    use crate::registry::MemoryRegistry;

    const RP: &str = "example.com";

    fn setup() -> (Arc<MemoryRegistry>, Persona, AuthenticatorAdapter) {
        setup_with(AuthenticatorConfig::default())
    }

    fn setup_with(config: AuthenticatorConfig) -> (Arc<MemoryRegistry>, Persona, AuthenticatorAdapter) {
        let registry = Arc::new(MemoryRegistry::new());
        let persona = Persona::generate();
        let adapter = AuthenticatorAdapter::with_config(
            registry.clone(),
            Arc::new(FirstPersona::single(persona.clone())),
            config,
        );
        (registry, persona, adapter)
    }

    fn rp() -> RelyingPartyId {
        RelyingPartyId::parse(RP).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_returns_same_key_pair() {
        let (_, persona, adapter) = setup();

        let (created, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        assert_eq!(id, derive_credential_id(persona.secret_key(), &rp()));

        let (fetched, fetched_id) = adapter.get_key_pair_by_key_wrap(RP, &[id]).await.unwrap();
        assert_eq!(fetched_id, id);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_publishes_binding_then_key() {
        let (registry, persona, adapter) = setup();
        let (_, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        let stats = registry.stats();
        assert_eq!(stats.bindings, 1);
        assert_eq!(stats.key_records, 1);
        assert_eq!(stats.writes, 2);

        let bound = registry
            .search_credentials(persona.public_key(), &rp())
            .await
            .unwrap();
        assert_eq!(bound, vec![id]);
    }

    #[tokio::test]
    async fn test_stored_record_is_not_the_plain_secret() {
        let (registry, _, adapter) = setup();
        let (key_pair, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        let records = registry.search_keys(&id).await.unwrap();
        assert_eq!(records.len(), 1);
        let secret = key_pair.secret_bytes();
        assert!(!records[0]
            .as_bytes()
            .windows(secret.len())
            .any(|w| w == secret.as_slice()));
    }

    #[tokio::test]
    async fn test_exclusion_hit_performs_no_writes() {
        let (registry, _, adapter) = setup();
        let (_, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        let writes_before = registry.stats().writes;

        let result = adapter.create_key_pair_by_key_wrap(RP, &[id]).await;
        assert!(matches!(
            result,
            Err(KeywrapError::CredentialAlreadyExists { .. })
        ));
        assert_eq!(registry.stats().writes, writes_before);
    }

    #[tokio::test]
    async fn test_exclusion_of_own_id_before_binding_is_visible() {
        let (registry, persona, adapter) = setup();
        let own = derive_credential_id(persona.secret_key(), &rp());

        let result = adapter.create_key_pair_by_key_wrap(RP, &[own]).await;
        assert!(matches!(
            result,
            Err(KeywrapError::CredentialAlreadyExists { .. })
        ));
        assert_eq!(registry.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_unrelated_exclusions_do_not_block_create() {
        let (_, _, adapter) = setup();
        let unrelated = CredentialId::from_bytes([0xAB; 32]);
        assert!(adapter
            .create_key_pair_by_key_wrap(RP, &[unrelated])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_candidates_are_not_found() {
        let (_, _, adapter) = setup();
        adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        let result = adapter
            .get_key_pair_by_key_wrap(RP, &[CredentialId::from_bytes([7u8; 32])])
            .await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_candidate_list_is_not_found() {
        let (_, _, adapter) = setup();
        adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        let result = adapter.get_key_pair_by_key_wrap(RP, &[]).await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_other_relying_party_sees_nothing() {
        let (_, _, adapter) = setup();
        let (_, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        let result = adapter.get_key_pair_by_key_wrap("other.example", &[id]).await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_garbage_records_are_skipped() {
        let (registry, persona, adapter) = setup();
        let id = derive_credential_id(persona.secret_key(), &rp());

        // A record under a foreign key and a truncated one, ahead of the real one.
        let foreign = wrap(&WrapKey::from_bytes([5u8; 32]), &[1u8; 32]).unwrap();
        registry.inject_record(&id, foreign);
        registry.inject_record(&id, WrappedKeyRecord::from_bytes(vec![0u8; 8]));

        let (created, created_id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        assert_eq!(created_id, id);
        assert_eq!(registry.search_keys(&id).await.unwrap().len(), 3);

        let (fetched, _) = adapter.get_key_pair_by_key_wrap(RP, &[id]).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_record_decrypting_to_invalid_scalar_is_skipped() {
        let (registry, persona, adapter) = setup();
        let id = derive_credential_id(persona.secret_key(), &rp());
        let proof = persona.prove_binding(&rp(), &id);
        registry
            .publish_credential(persona.public_key(), &rp(), &id, &proof)
            .await
            .unwrap();

        let wrap_key = WrapKey::derive(persona.secret_key(), persona.public_key()).unwrap();
        registry.inject_record(&id, wrap(&wrap_key, &[0u8; 32]).unwrap());

        let result = adapter.get_key_pair_by_key_wrap(RP, &[id]).await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_binding_without_key_is_not_found() {
        let (registry, persona, adapter) = setup();
        let id = derive_credential_id(persona.secret_key(), &rp());
        let proof = persona.prove_binding(&rp(), &id);
        registry
            .publish_credential(persona.public_key(), &rp(), &id, &proof)
            .await
            .unwrap();

        let result = adapter.get_key_pair_by_key_wrap(RP, &[id]).await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_candidate_cap_reports_unavailable() {
        let config = AuthenticatorConfig::default()
            .with_binding(CredentialIdBinding::KeyPair)
            .with_max_unwrap_attempts(2);
        let (registry, persona, adapter) = setup_with(config);

        // Three bound ids with no usable records.
        let mut ids = Vec::new();
        for i in 0..3u8 {
            let id = CredentialId::from_bytes([i + 1; 32]);
            let proof = persona.prove_binding(&rp(), &id);
            registry
                .publish_credential(persona.public_key(), &rp(), &id, &proof)
                .await
                .unwrap();
            ids.push(id);
        }

        let result = adapter.get_key_pair_by_key_wrap(RP, &ids).await;
        assert!(matches!(result, Err(KeywrapError::RegistryUnavailable(_))));

        // Within the cap, exhaustion is a plain miss.
        let result = adapter.get_key_pair_by_key_wrap(RP, &ids[..2]).await;
        assert!(matches!(result, Err(KeywrapError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn test_attempt_cap_counts_records_under_one_id() {
        let config = AuthenticatorConfig::default().with_max_unwrap_attempts(2);
        let (registry, persona, adapter) = setup_with(config);
        let id = derive_credential_id(persona.secret_key(), &rp());
        let proof = persona.prove_binding(&rp(), &id);
        registry
            .publish_credential(persona.public_key(), &rp(), &id, &proof)
            .await
            .unwrap();

        let foreign = WrapKey::from_bytes([9u8; 32]);
        for _ in 0..500 {
            registry.inject_record(&id, wrap(&foreign, &[1u8; 32]).unwrap());
        }

        let result = adapter.get_key_pair_by_key_wrap(RP, &[id]).await;
        assert!(matches!(result, Err(KeywrapError::RegistryUnavailable(_))));
    }

    #[tokio::test]
    async fn test_valid_record_within_attempt_cap_is_found() {
        let config = AuthenticatorConfig::default().with_max_unwrap_attempts(3);
        let (registry, persona, adapter) = setup_with(config);
        let id = derive_credential_id(persona.secret_key(), &rp());

        let foreign = WrapKey::from_bytes([9u8; 32]);
        registry.inject_record(&id, wrap(&foreign, &[1u8; 32]).unwrap());
        registry.inject_record(&id, wrap(&foreign, &[2u8; 32]).unwrap());

        let (created, _) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        let (fetched, _) = adapter.get_key_pair_by_key_wrap(RP, &[id]).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_keypair_binding_mints_fresh_ids() {
        let config = AuthenticatorConfig::default().with_binding(CredentialIdBinding::KeyPair);
        let (_, _, adapter) = setup_with(config);

        let (first, first_id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        let (second, second_id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();
        assert_ne!(first_id, second_id);
        assert_eq!(first_id, derive_credential_id(first.secret_key(), &rp()));

        let (fetched, id) = adapter
            .get_key_pair_by_key_wrap(RP, &[second_id])
            .await
            .unwrap();
        assert_eq!(id, second_id);
        assert_eq!(fetched, second);

        let result = adapter
            .create_key_pair_by_key_wrap(RP, &[first_id])
            .await;
        assert!(matches!(
            result,
            Err(KeywrapError::CredentialAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_resident_key_pair_is_persona() {
        let (registry, persona, adapter) = setup();
        let (key_pair, id) = adapter.get_resident_key_pair(RP).await.unwrap();

        assert_eq!(key_pair.public_key(), persona.public_key());
        assert_eq!(id, derive_credential_id(persona.secret_key(), &rp()));
        assert_eq!(registry.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_sign_counter_pass_through() {
        let (_, _, adapter) = setup();
        let (_, id) = adapter.create_key_pair_by_key_wrap(RP, &[]).await.unwrap();

        assert_eq!(adapter.get_sign_count(&id).await.unwrap(), 0);
        assert_eq!(adapter.increment_sign_count(&id).await.unwrap(), 1);
        assert_eq!(adapter.increment_sign_count(&id).await.unwrap(), 2);
        assert_eq!(adapter.get_sign_count(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rp_id_is_input_error() {
        let (registry, _, adapter) = setup();
        for bad in ["", "https://example.com", "127.0.0.1"] {
            let result = adapter.create_key_pair_by_key_wrap(bad, &[]).await;
            assert!(matches!(result, Err(KeywrapError::InputError(_))), "{bad}");
        }
        assert_eq!(registry.stats().writes, 0);
    }

    #[tokio::test]
    async fn test_dismissed_picker_is_input_error() {
        let registry = Arc::new(MemoryRegistry::new());
        let adapter = AuthenticatorAdapter::new(
            registry,
            Arc::new(SelectWith(|_: &RelyingPartyId| None)),
        );
        let result = adapter.get_resident_key_pair(RP).await;
        assert!(matches!(result, Err(KeywrapError::InputError(_))));
    }

    #[tokio::test]
    async fn test_registry_outage_surfaces_typed() {
        let (registry, _, adapter) = setup();
        registry.fail_next(1);
        let result = adapter.create_key_pair_by_key_wrap(RP, &[]).await;
        assert!(matches!(result, Err(KeywrapError::RegistryUnavailable(_))));
        assert_eq!(registry.stats().writes, 0);
    }

    /// Holds every `search_credentials` caller until `parties` of them have
    /// read, so racing creates all see the registry before anyone writes.
    struct GatedRegistry {
        inner: Arc<MemoryRegistry>,
        gate: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl CredentialRegistry for GatedRegistry {
        async fn publish_credential(
            &self,
            persona_public: &PublicKey,
            rp_id: &RelyingPartyId,
            credential_id: &CredentialId,
            proof: &BindingProof,
        ) -> Result<()> {
            self.inner
                .publish_credential(persona_public, rp_id, credential_id, proof)
                .await
        }

        async fn publish_key(
            &self,
            credential_id: &CredentialId,
            proof: &WrapProof,
            record: &WrappedKeyRecord,
        ) -> Result<()> {
            self.inner.publish_key(credential_id, proof, record).await
        }

        async fn search_credentials(
            &self,
            persona_public: &PublicKey,
            rp_id: &RelyingPartyId,
        ) -> Result<Vec<CredentialId>> {
            let bound = self.inner.search_credentials(persona_public, rp_id).await;
            self.gate.wait().await;
            bound
        }

        async fn search_keys(&self, credential_id: &CredentialId) -> Result<Vec<WrappedKeyRecord>> {
            self.inner.search_keys(credential_id).await
        }

        async fn get_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
            self.inner.get_sign_count(credential_id).await
        }

        async fn increment_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
            self.inner.increment_sign_count(credential_id).await
        }
    }

    #[tokio::test]
    async fn test_racing_creates_leave_recoverable_records() {
        let store = Arc::new(MemoryRegistry::new());
        let persona = Persona::generate();
        let gated = Arc::new(GatedRegistry {
            inner: store.clone(),
            gate: tokio::sync::Barrier::new(2),
        });
        let racing = AuthenticatorAdapter::new(
            gated,
            Arc::new(FirstPersona::single(persona.clone())),
        );

        let (a, b) = tokio::join!(
            racing.create_key_pair_by_key_wrap(RP, &[]),
            racing.create_key_pair_by_key_wrap(RP, &[]),
        );
        let (first, id_a) = a.unwrap();
        let (second, id_b) = b.unwrap();
        assert_eq!(id_a, id_b);
        assert_ne!(first, second);

        // Both published: the binding once, the key under it twice.
        let stats = store.stats();
        assert_eq!(stats.bindings, 1);
        assert_eq!(stats.key_records, 2);
        assert_eq!(stats.writes, 4);

        let reader = AuthenticatorAdapter::new(store, Arc::new(FirstPersona::single(persona)));
        let (fetched, _) = reader.get_key_pair_by_key_wrap(RP, &[id_a]).await.unwrap();
        assert!(fetched == first || fetched == second);
    }

    #[test]
    fn test_key_pair_debug_redacts_secret() {
        let key_pair = AuthenticatorKeyPair::generate();
        let debug = format!("{key_pair:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode(key_pair.secret_bytes().as_slice())));
    }

    #[test]
    fn test_key_pair_rejects_non_scalar() {
        assert!(matches!(
            AuthenticatorKeyPair::from_secret_bytes(&[0u8; 32]),
            Err(KeywrapError::CryptoError(_))
        ));
        assert!(matches!(
            AuthenticatorKeyPair::from_secret_bytes(&[1u8; 16]),
            Err(KeywrapError::CryptoError(_))
        ));
    }
}
