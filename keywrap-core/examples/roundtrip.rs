//! Example: create a credential, then recover it with a fresh adapter.
//!
//! Run with: cargo run -p keywrap-core --example roundtrip

use std::sync::Arc;

use keywrap_core::{AuthenticatorAdapter, FirstPersona, MemoryRegistry, Persona};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> keywrap_core::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::new("keywrap_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Keywrap Roundtrip Demo ===\n");

    let persona = Persona::generate().with_nickname("demo");
    let registry = Arc::new(MemoryRegistry::new());

    let creator = AuthenticatorAdapter::new(
        registry.clone(),
        Arc::new(FirstPersona::single(persona.clone())),
    );
    let (created, credential_id) = creator
        .create_key_pair_by_key_wrap("example.com", &[])
        .await?;
    println!("\nCreated credential {}", credential_id.to_base64url());
    println!("   Public key: {}", hex::encode(created.public_key_sec1()));
    println!("   Registry:   {:?}\n", registry);

    // A second adapter shares nothing with the first but the persona.
    let verifier = AuthenticatorAdapter::new(registry.clone(), Arc::new(FirstPersona::single(persona)));
    let (recovered, _) = verifier
        .get_key_pair_by_key_wrap("example.com", &[credential_id])
        .await?;
    let count = verifier.increment_sign_count(&credential_id).await?;

    if recovered == created {
        println!("\n✅ Recovered the same key pair (sign count {count})");
    } else {
        println!("\n❌ Recovered a different key pair");
    }
    Ok(())
}
