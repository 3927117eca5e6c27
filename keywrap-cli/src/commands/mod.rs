//! Subcommand implementations.

pub mod counter;
pub mod create;
pub mod derive_id;
pub mod get;
pub mod keygen;
pub mod resident;
