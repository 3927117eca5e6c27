//! Derive-id command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use keywrap_core::{derive_credential_id, RelyingPartyId};

use crate::utils::load_persona;

/// Execute the derive-id command.
pub async fn execute(persona: PathBuf, rp: String, quiet: bool) -> Result<()> {
    let persona = load_persona(&persona)?;
    let rp_id = RelyingPartyId::parse(&rp).context("Invalid relying party id")?;

    let credential_id = derive_credential_id(persona.secret_key(), &rp_id);

    if quiet {
        println!("{}", credential_id.to_base64url());
    } else {
        println!("   {} {}", "Relying party:".dimmed(), rp_id);
        println!("   {} {}", "Credential id:".dimmed(), credential_id.to_base64url());
        println!("   {} {}", "Hex:".dimmed(), credential_id);
    }
    Ok(())
}
