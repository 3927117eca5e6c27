//! Counter command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use keywrap_core::{CredentialId, CredentialRegistry};
use tracing::info;

use crate::utils::load_registry;

/// Execute the counter command.
pub async fn execute(
    registry_path: PathBuf,
    credential: CredentialId,
    increment: bool,
    quiet: bool,
) -> Result<()> {
    let loaded = load_registry(&registry_path, false)?;

    let count = if increment {
        let count = loaded.registry.increment_sign_count(&credential).await?;
        loaded.save(&registry_path, None)?;
        info!(credential_id = %credential, count, "Sign counter incremented");
        count
    } else {
        loaded.registry.get_sign_count(&credential).await?
    };

    if quiet {
        println!("{count}");
    } else {
        println!("   {} {}", "Credential id:".dimmed(), credential.to_base64url());
        println!("   {} {}", "Sign count:".dimmed(), count.to_string().bold());
    }
    Ok(())
}
