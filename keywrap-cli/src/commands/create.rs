//! Create command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use keywrap_core::{AuthenticatorConfig, CredentialId, CredentialIdBinding};
use tracing::info;

use crate::utils::{adapter, load_persona, load_registry};
use crate::OutputFormat;

/// Execute the create command.
pub async fn execute(
    persona_path: PathBuf,
    registry_path: PathBuf,
    rp: String,
    exclude: Vec<CredentialId>,
    format: Option<OutputFormat>,
    bind: Option<CredentialIdBinding>,
    quiet: bool,
) -> Result<()> {
    let persona = load_persona(&persona_path)?;
    let loaded = load_registry(&registry_path, true)?;

    let mut config = AuthenticatorConfig::from_env();
    if let Some(binding) = bind {
        config = config.with_binding(binding);
    }

    let (key_pair, credential_id) = adapter(loaded.registry.clone(), persona, config)
        .create_key_pair_by_key_wrap(&rp, &exclude)
        .await
        .with_context(|| format!("Failed to create credential for {rp}"))?;

    loaded.save(&registry_path, format)?;

    info!(
        credential_id = %credential_id,
        registry = %registry_path.display(),
        "Credential created"
    );

    if quiet {
        println!("{}", credential_id.to_base64url());
    } else {
        println!("{} Credential created for {}", "✓".green().bold(), rp);
        println!("   {} {}", "Credential id:".dimmed(), credential_id.to_base64url());
        println!(
            "   {} {}",
            "Public key:".dimmed(),
            hex::encode(key_pair.public_key_sec1())
        );
        println!("   {} {}", "Registry:".dimmed(), registry_path.display());
    }
    Ok(())
}
