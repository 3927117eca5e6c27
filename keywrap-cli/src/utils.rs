//! Common utility functions shared across CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use keywrap_core::{
    AuthenticatorAdapter, AuthenticatorConfig, CredentialId, FirstPersona, MemoryRegistry,
    Persona, RegistrySnapshot, RetryConfig, RetryingRegistry,
};
use tracing::debug;

use crate::OutputFormat;

/// Parse a credential id given on the command line: base64url, or hex.
pub fn parse_credential_id(s: &str) -> std::result::Result<CredentialId, String> {
    CredentialId::from_base64url(s)
        .or_else(|_| CredentialId::from_hex(s))
        .map_err(|_| format!("'{s}' is not a 32-byte credential id (base64url or hex)"))
}

/// Load a persona from a private JWK file.
pub fn load_persona(path: &Path) -> Result<Persona> {
    let jwk = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read persona file: {}", path.display()))?;

    let persona = Persona::from_jwk(jwk.trim())
        .with_context(|| format!("Failed to parse persona file: {}", path.display()))?;

    debug!(path = %path.display(), "Loaded persona");
    Ok(persona)
}

/// Write a persona as a private JWK, readable only by the owner on Unix.
pub fn save_persona(path: &Path, persona: &Persona, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Refusing to overwrite existing file: {} (use --force)",
            path.display()
        );
    }

    let jwk = persona.to_jwk();
    write_private(path, jwk.as_bytes())
        .with_context(|| format!("Failed to write persona file: {}", path.display()))
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}

/// A registry loaded from disk, with the format it was stored in.
pub struct LoadedRegistry {
    pub registry: Arc<RetryingRegistry<MemoryRegistry>>,
    pub format: Option<OutputFormat>,
}

impl LoadedRegistry {
    /// Snapshot the registry and write it back, in `format` or the format
    /// it was read in (CBOR for new files).
    pub fn save(&self, path: &Path, format: Option<OutputFormat>) -> Result<()> {
        let format = format.or(self.format).unwrap_or(OutputFormat::Cbor);
        let snapshot = self.registry.inner().snapshot();

        let bytes = match format {
            OutputFormat::Cbor => snapshot.to_cbor()?,
            OutputFormat::Json => snapshot.to_json()?.into_bytes(),
        };

        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write registry file: {}", path.display()))?;

        debug!(path = %path.display(), format = ?format, bytes = bytes.len(), "Saved registry");
        Ok(())
    }
}

/// Load a registry file, trying CBOR first then JSON.
///
/// A missing file yields an empty registry when `create` is set.
pub fn load_registry(path: &Path, create: bool) -> Result<LoadedRegistry> {
    if create && !path.exists() {
        debug!(path = %path.display(), "Starting empty registry");
        return Ok(wrap_registry(MemoryRegistry::new(), None));
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read registry file: {}", path.display()))?;

    let (snapshot, format) = if let Ok(snapshot) = RegistrySnapshot::from_cbor(&bytes) {
        debug!(format = "cbor", "Parsed registry");
        (snapshot, OutputFormat::Cbor)
    } else if let Ok(snapshot) = RegistrySnapshot::from_json(&bytes) {
        debug!(format = "json", "Parsed registry");
        (snapshot, OutputFormat::Json)
    } else {
        bail!("Failed to parse registry file (tried CBOR and JSON)");
    };

    let registry = MemoryRegistry::from_snapshot(snapshot)
        .with_context(|| format!("Unsupported registry file: {}", path.display()))?;
    Ok(wrap_registry(registry, Some(format)))
}

fn wrap_registry(registry: MemoryRegistry, format: Option<OutputFormat>) -> LoadedRegistry {
    LoadedRegistry {
        registry: Arc::new(RetryingRegistry::with_config(registry, RetryConfig::from_env())),
        format,
    }
}

/// Build an adapter serving `persona` against `registry`.
pub fn adapter(
    registry: Arc<RetryingRegistry<MemoryRegistry>>,
    persona: Persona,
    config: AuthenticatorConfig,
) -> AuthenticatorAdapter {
    AuthenticatorAdapter::with_config(registry, Arc::new(FirstPersona::single(persona)), config)
}
