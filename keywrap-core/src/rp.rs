//! Relying-party identifiers.

use url::Host;

use crate::error::{KeywrapError, Result};

/// A validated, normalized WebAuthn relying-party id.
///
/// Relying-party ids are DNS domains. Parsing lower-cases and IDNA-encodes the
/// input, so every spelling of the same domain derives the same credential id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelyingPartyId(String);

impl RelyingPartyId {
    /// Parse and normalize a relying-party id.
    pub fn parse(rp_id: &str) -> Result<Self> {
        if rp_id.is_empty() {
            return Err(KeywrapError::InputError("relying party id is empty".into()));
        }
        if rp_id.chars().any(|c| c.is_whitespace()) || rp_id.contains("://") {
            return Err(KeywrapError::InputError(format!(
                "relying party id is not a domain: {rp_id:?}"
            )));
        }

        match Host::parse(rp_id) {
            Ok(Host::Domain(domain)) => Ok(Self(domain)),
            Ok(_) => Err(KeywrapError::InputError(format!(
                "relying party id must be a domain, not an IP address: {rp_id}"
            ))),
            Err(e) => Err(KeywrapError::InputError(format!(
                "invalid relying party id {rp_id:?}: {e}"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelyingPartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelyingPartyId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
