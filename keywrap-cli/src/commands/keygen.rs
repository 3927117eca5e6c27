//! Keygen command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use keywrap_core::Persona;
use tracing::info;

use crate::utils::save_persona;

/// Execute the keygen command.
pub async fn execute(out: PathBuf, force: bool, quiet: bool) -> Result<()> {
    let persona = Persona::generate();
    save_persona(&out, &persona, force)?;

    let public_key = hex::encode(persona.public_key_sec1());
    info!(path = %out.display(), public_key = %public_key, "Persona generated");

    if quiet {
        println!("{public_key}");
    } else {
        println!("{} Persona written to {}", "✓".green().bold(), out.display());
        println!("   {} {}", "Public key:".dimmed(), public_key);
        println!(
            "   {}",
            "Keep this file private: it recovers every credential it creates.".yellow()
        );
    }
    Ok(())
}
