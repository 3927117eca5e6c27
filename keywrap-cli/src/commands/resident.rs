//! Resident command implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use keywrap_core::{AuthenticatorConfig, MemoryRegistry, RetryingRegistry};

use crate::utils::{adapter, load_persona};

/// Execute the resident command.
///
/// The resident credential is derived from the persona alone, so no registry
/// file is involved.
pub async fn execute(persona_path: PathBuf, rp: String, quiet: bool) -> Result<()> {
    let persona = load_persona(&persona_path)?;
    let registry = Arc::new(RetryingRegistry::new(MemoryRegistry::new()));

    let (key_pair, credential_id) = adapter(registry, persona, AuthenticatorConfig::from_env())
        .get_resident_key_pair(&rp)
        .await
        .with_context(|| format!("Failed to derive resident credential for {rp}"))?;

    if quiet {
        println!("{}", credential_id.to_base64url());
    } else {
        println!("   {} {}", "Relying party:".dimmed(), rp);
        println!("   {} {}", "Credential id:".dimmed(), credential_id.to_base64url());
        println!(
            "   {} {}",
            "Public key:".dimmed(),
            hex::encode(key_pair.public_key_sec1())
        );
    }
    Ok(())
}
