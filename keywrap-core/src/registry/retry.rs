//! Registry decorator with retry and exponential backoff.
//!
//! Only `RegistryUnavailable` is retried. Everything else (rejections, missing
//! entries) is permanent and returned on the first attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use p256::PublicKey;
use tracing::{debug, warn};

use super::CredentialRegistry;
use crate::credential_id::CredentialId;
use crate::error::{KeywrapError, Result};
use crate::keywrap::{WrapProof, WrappedKeyRecord};
use crate::persona::BindingProof;
use crate::rp::RelyingPartyId;

/// Initial retry interval.
const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum retry interval.
const MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Give up after this much time spent retrying one operation.
const MAX_ELAPSED: Duration = Duration::from_secs(10);

/// Backoff settings for [`RetryingRegistry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial retry interval.
    pub initial_interval: Duration,
    /// Maximum retry interval.
    pub max_interval: Duration,
    /// Total time budget per operation.
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: INITIAL_INTERVAL,
            max_interval: MAX_INTERVAL,
            max_elapsed_time: MAX_ELAPSED,
        }
    }
}

impl RetryConfig {
    /// Load settings from the environment, falling back to defaults.
    ///
    /// Optional: `KEYWRAP_RETRY_INITIAL_MS`, `KEYWRAP_RETRY_MAX_MS`,
    /// `KEYWRAP_RETRY_MAX_ELAPSED_MS`.
    pub fn from_env() -> Self {
        let millis = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            initial_interval: millis("KEYWRAP_RETRY_INITIAL_MS", INITIAL_INTERVAL),
            max_interval: millis("KEYWRAP_RETRY_MAX_MS", MAX_INTERVAL),
            max_elapsed_time: millis("KEYWRAP_RETRY_MAX_ELAPSED_MS", MAX_ELAPSED),
        }
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed_time),
            ..Default::default()
        }
    }
}

/// Wraps a registry and retries transient failures.
///
/// A retried `increment_sign_count` may advance the counter more than once
/// when the first attempt landed but its reply was lost. The counter stays
/// monotonic, which is all verifiers rely on.
pub struct RetryingRegistry<R> {
    inner: R,
    config: RetryConfig,
}

impl<R: CredentialRegistry> RetryingRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: R, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let start = Instant::now();

        let result = retry_notify(
            self.config.build_backoff(),
            || {
                let fut = attempt();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_retryable() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: KeywrapError, duration: Duration| {
                warn!(
                    operation,
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await;

        let total_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(operation, total_latency_ms = total_ms, "Registry call succeeded"),
            Err(e) if e.is_retryable() => {
                warn!(operation, error = %e, total_latency_ms = total_ms, "Registry call failed after all retries")
            }
            Err(_) => {}
        }

        result
    }
}

#[async_trait]
impl<R: CredentialRegistry> CredentialRegistry for RetryingRegistry<R> {
    async fn publish_credential(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
        credential_id: &CredentialId,
        proof: &BindingProof,
    ) -> Result<()> {
        self.with_retry("publish_credential", || {
            self.inner
                .publish_credential(persona_public, rp_id, credential_id, proof)
        })
        .await
    }

    async fn publish_key(
        &self,
        credential_id: &CredentialId,
        proof: &WrapProof,
        record: &WrappedKeyRecord,
    ) -> Result<()> {
        self.with_retry("publish_key", || {
            self.inner.publish_key(credential_id, proof, record)
        })
        .await
    }

    async fn search_credentials(
        &self,
        persona_public: &PublicKey,
        rp_id: &RelyingPartyId,
    ) -> Result<Vec<CredentialId>> {
        self.with_retry("search_credentials", || {
            self.inner.search_credentials(persona_public, rp_id)
        })
        .await
    }

    async fn search_keys(&self, credential_id: &CredentialId) -> Result<Vec<WrappedKeyRecord>> {
        self.with_retry("search_keys", || self.inner.search_keys(credential_id))
            .await
    }

    async fn get_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        self.with_retry("get_sign_count", || self.inner.get_sign_count(credential_id))
            .await
    }

    async fn increment_sign_count(&self, credential_id: &CredentialId) -> Result<u32> {
        self.with_retry("increment_sign_count", || {
            self.inner.increment_sign_count(credential_id)
        })
        .await
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for RetryingRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingRegistry")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish()
    }
}
