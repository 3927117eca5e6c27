//! Authenticator configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeywrapError;

/// Default cap on candidate credentials tried by a single `get`.
pub const DEFAULT_MAX_UNWRAP_ATTEMPTS: usize = 64;

/// Which secret a new credential id is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialIdBinding {
    /// `derive(persona secret, rp id)`: one stable id per persona and site.
    #[default]
    Persona,
    /// `derive(authenticator secret, rp id)`: a fresh id per created credential.
    KeyPair,
}

impl FromStr for CredentialIdBinding {
    type Err = KeywrapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persona" => Ok(Self::Persona),
            "keypair" | "key-pair" => Ok(Self::KeyPair),
            other => Err(KeywrapError::InputError(format!(
                "unknown credential id binding '{other}' (expected persona or keypair)"
            ))),
        }
    }
}

impl std::fmt::Display for CredentialIdBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persona => f.write_str("persona"),
            Self::KeyPair => f.write_str("keypair"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorConfig {
    /// Unwrap attempts `get` makes, across all candidate ids and their
    /// records, before giving up with `RegistryUnavailable`. A candidate with
    /// no records costs one attempt.
    pub max_unwrap_attempts: usize,
    pub credential_id_binding: CredentialIdBinding,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            max_unwrap_attempts: DEFAULT_MAX_UNWRAP_ATTEMPTS,
            credential_id_binding: CredentialIdBinding::default(),
        }
    }
}

impl AuthenticatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional: `KEYWRAP_MAX_UNWRAP_ATTEMPTS`, `KEYWRAP_CREDENTIAL_ID_BINDING`.
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_unwrap_attempts = std::env::var("KEYWRAP_MAX_UNWRAP_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_unwrap_attempts);

        let credential_id_binding = std::env::var("KEYWRAP_CREDENTIAL_ID_BINDING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.credential_id_binding);

        Self {
            max_unwrap_attempts,
            credential_id_binding,
        }
    }

    pub fn with_binding(mut self, binding: CredentialIdBinding) -> Self {
        self.credential_id_binding = binding;
        self
    }

    pub fn with_max_unwrap_attempts(mut self, max: usize) -> Self {
        self.max_unwrap_attempts = max;
        self
    }
}
