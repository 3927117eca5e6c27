#![no_main]

//! Fuzz target for unwrap()
//!
//! Registry records are attacker-controlled. Any byte string, including ones
//! shorter than the IV, must be rejected cleanly.
//!
//! Run with: cargo +nightly fuzz run fuzz_unwrap

use keywrap_core::{unwrap, AuthenticatorKeyPair, WrapKey, WrappedKeyRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = WrapKey::from_bytes([0x42; 32]);
    let record = WrappedKeyRecord::from_bytes(data.to_vec());
    if let Ok(plaintext) = unwrap(&key, &record) {
        let _ = AuthenticatorKeyPair::from_secret_bytes(&plaintext);
    }
});
