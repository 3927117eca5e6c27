//! In-memory credential registry.
//!
//! Used as the test double for the external registry and as the local store
//! behind the CLI, which persists it between runs as a [`RegistrySnapshot`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CredentialRegistry;
use crate::credential_id::CredentialId;
use crate::error::{KeywrapError, Result};
use crate::keywrap::{WrapProof, WrappedKeyRecord};
use crate::persona::BindingProof;
use crate::rp::RelyingPartyId;

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Binding namespace: (compressed SEC1 persona key, rp id).
type Namespace = (Vec<u8>, String);

/// A credential id bound under a persona and relying party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingEntry {
    #[serde(with = "hex::serde")]
    pub persona_public_key: Vec<u8>,
    pub rp_id: String,
    pub credential_id: CredentialId,
    pub proof: BindingProof,
    pub published_at: DateTime<Utc>,
}

/// A wrapped key record appended under a credential id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    pub credential_id: CredentialId,
    pub proof: WrapProof,
    pub record: WrappedKeyRecord,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterEntry {
    pub credential_id: CredentialId,
    pub count: u32,
}

/// Serializable image of a [`MemoryRegistry`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub bindings: Vec<BindingEntry>,
    pub keys: Vec<KeyEntry>,
    pub counters: Vec<CounterEntry>,
}

impl RegistrySnapshot {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| KeywrapError::SerializationError(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| KeywrapError::SerializationError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KeywrapError::SerializationError(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| KeywrapError::SerializationError(e.to_string()))
    }
}

/// Registry statistics for monitoring and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub bindings: usize,
    pub key_records: usize,
    pub counters: usize,
    /// Write requests received (publishes and increments), accepted or not.
    pub writes: u64,
}

/// DashMap-backed registry with list-append semantics.
#[derive(Default)]
pub struct MemoryRegistry {
    bindings: DashMap<Namespace, Vec<BindingEntry>>,
    keys: DashMap<CredentialId, Vec<KeyEntry>>,
    counters: DashMap<CredentialId, u32>,
    writes: AtomicU64,
    /// Remaining operations to fail with `RegistryUnavailable`.
    outages: AtomicU32,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a snapshot, preserving entry order.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(KeywrapError::SerializationError(format!(
                "unsupported registry snapshot version {}",
                snapshot.version
            )));
        }

        let registry = Self::new();
        for entry in snapshot.bindings {
            let namespace = (entry.persona_public_key.clone(), entry.rp_id.clone());
            registry.bindings.entry(namespace).or_default().push(entry);
        }
        for entry in snapshot.keys {
            registry
                .keys
                .entry(entry.credential_id)
                .or_default()
                .push(entry);
        }
        for entry in snapshot.counters {
            registry.counters.insert(entry.credential_id, entry.count);
        }
        Ok(registry)
    }

    /// Capture every entry. Entries are ordered by publication time.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut bindings: Vec<BindingEntry> = self
            .bindings
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        bindings.sort_by_key(|entry| entry.published_at);

        let mut keys: Vec<KeyEntry> = self
            .keys
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        keys.sort_by_key(|entry| entry.published_at);

        let mut counters: Vec<CounterEntry> = self
            .counters
            .iter()
            .map(|entry| CounterEntry {
                credential_id: *entry.key(),
                count: *entry.value(),
            })
            .collect();
        counters.sort_by_key(|entry| entry.credential_id);

        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            bindings,
            keys,
            counters,
        }
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            bindings: self.bindings.iter().map(|entry| entry.value().len()).sum(),
            key_records: self.keys.iter().map(|entry| entry.value().len()).sum(),
            counters: self.counters.len(),
            writes: self.writes.load(Ordering::SeqCst),
        }
    }

    /// Make the next `count` operations fail with `RegistryUnavailable`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next(&self, count: u32) {
        self.outages.store(count, Ordering::SeqCst);
    }

    /// Append a raw record without a proof check, as a buggy or hostile
    /// replica might.
    #[cfg(any(test, feature = "test-util"))]
    pub fn inject_record(&self, credential_id: &CredentialId, record: WrappedKeyRecord) {
        let mut proof = [0u8; 32];
        proof[..8].copy_from_slice(&(self.stats().key_records as u64).to_be_bytes());
        self.keys.entry(*credential_id).or_default().push(KeyEntry {
            credential_id: *credential_id,
            proof: WrapProof::from_bytes(proof),
            record,
            published_at: Utc::now(),
        });
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        let taken = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if taken.is_ok() {
            warn!(operation, "Simulated registry outage");
            return Err(KeywrapError::RegistryUnavailable(format!(
                "{operation}: registry unreachable"
            )));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn namespace(persona_public: &PublicKey, rp_id: &RelyingPartyId) -> Namespace {
    (
        persona_public.to_encoded_point(true).as_bytes().to_vec(),
        rp_id.as_str().to_string(),
    )
}

#[async_trait]
impl CredentialRegistry for MemoryRegistry {
    async fn publish_credential(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
        credential_id: &CredentialId,
        proof: &BindingProof,
    ) -> Result<()> {
        self.check_available("publish_credential")?;
        self.record_write();

        if !proof.verify(persona_public, rp_id, credential_id) {
            return Err(KeywrapError::RegistryRejected(
                "binding proof does not verify against persona key".into(),
            ));
        }

        let namespace = namespace(persona_public, rp_id);
        let mut entries = self.bindings.entry(namespace.clone()).or_default();
        if entries
            .iter()
            .any(|entry| entry.credential_id == *credential_id)
        {
            debug!(credential_id = %credential_id, "Binding already present");
            return Ok(());
        }

        entries.push(BindingEntry {
            persona_public_key: namespace.0,
            rp_id: namespace.1,
            credential_id: *credential_id,
            proof: proof.clone(),
            published_at: Utc::now(),
        });
        debug!(credential_id = %credential_id, rp_id = %rp_id, "Binding published");
        Ok(())
    }

    async fn publish_key(
        &self,
        credential_id: &CredentialId,
        proof: &WrapProof,
        record: &WrappedKeyRecord,
    ) -> Result<()> {
        self.check_available("publish_key")?;
        self.record_write();

        let mut entries = self.keys.entry(*credential_id).or_default();
        if entries.iter().any(|entry| entry.proof == *proof) {
            debug!(credential_id = %credential_id, "Key record already present");
            return Ok(());
        }

        entries.push(KeyEntry {
            credential_id: *credential_id,
            proof: *proof,
            record: record.clone(),
            published_at: Utc::now(),
        });
        debug!(
            credential_id = %credential_id,
            records = entries.len(),
            "Key record appended"
        );
        Ok(())
    }

    async fn search_credentials(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
    ) -> Result<Vec<CredentialId>> {
        self.check_available("search_credentials")?;

        Ok(self
            .bindings
            .get(&namespace(persona_public, rp_id))
            .map(|entries| entries.iter().map(|entry| entry.credential_id).collect())
            .unwrap_or_default())
    }

    async fn search_keys(&self, credential_id: &CredentialId) -> Result<Vec<WrappedKeyRecord>> {
        self.check_available("search_keys")?;

        Ok(self
            .keys
            .get(credential_id)
            .map(|entries| entries.iter().map(|entry| entry.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        self.check_available("get_sign_count")?;

        Ok(self
            .counters
            .get(credential_id)
            .map(|count| *count)
            .unwrap_or(0))
    }

    async fn increment_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        self.check_available("increment_sign_count")?;
        self.record_write();

        let mut count = self.counters.entry(*credential_id).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("MemoryRegistry")
            .field("bindings", &stats.bindings)
            .field("key_records", &stats.key_records)
            .field("counters", &stats.counters)
            .finish()
    }
}
