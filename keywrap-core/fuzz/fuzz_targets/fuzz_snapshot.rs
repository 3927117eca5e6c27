#![no_main]

//! Fuzz target for RegistrySnapshot::from_cbor()
//!
//! Registry images are read back from disk by the CLI, so malformed input
//! must surface as an error, never a panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_snapshot

use keywrap_core::{MemoryRegistry, RegistrySnapshot};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(snapshot) = RegistrySnapshot::from_cbor(data) {
        if let Ok(registry) = MemoryRegistry::from_snapshot(snapshot) {
            let _ = registry.snapshot().to_cbor();
        }
    }
    let _ = RegistrySnapshot::from_json(data);
});
