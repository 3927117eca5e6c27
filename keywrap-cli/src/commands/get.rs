//! Get command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use keywrap_core::{AuthenticatorConfig, CredentialId};
use tracing::info;

use crate::utils::{adapter, load_persona, load_registry};

/// Execute the get command.
pub async fn execute(
    persona_path: PathBuf,
    registry_path: PathBuf,
    rp: String,
    credentials: Vec<CredentialId>,
    quiet: bool,
) -> Result<()> {
    let persona = load_persona(&persona_path)?;
    let loaded = load_registry(&registry_path, false)?;

    let adapter = adapter(loaded.registry.clone(), persona, AuthenticatorConfig::from_env());
    let (key_pair, credential_id) = adapter
        .get_key_pair_by_key_wrap(&rp, &credentials)
        .await
        .with_context(|| format!("Failed to recover credential for {rp}"))?;
    let sign_count = adapter.get_sign_count(&credential_id).await?;

    info!(credential_id = %credential_id, sign_count, "Credential recovered");

    let public_key = hex::encode(key_pair.public_key_sec1());
    if quiet {
        println!("{public_key}");
    } else {
        println!("{} Credential recovered for {}", "✓".green().bold(), rp);
        println!("   {} {}", "Credential id:".dimmed(), credential_id.to_base64url());
        println!("   {} {}", "Public key:".dimmed(), public_key);
        println!("   {} {}", "Sign count:".dimmed(), sign_count);
    }
    Ok(())
}
