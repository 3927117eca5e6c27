//! Exit codes following sysexits.h conventions.
//!
//! Scripts driving the CLI can tell a missing credential from a registry
//! outage without parsing messages.

use std::io;

use keywrap_core::KeywrapError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Invalid arguments or input data.
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// No stored credential could be unwrapped.
/// Maps to EX_DATAERR from sysexits.h.
pub const CREDENTIAL_NOT_FOUND: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Registry unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const REGISTRY_UNAVAILABLE: i32 = 69;

/// The relying party already holds a credential from this persona.
/// Maps to EX_CANTCREAT from sysexits.h.
pub const CREDENTIAL_EXISTS: i32 = 73;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self {
            code: classify(err),
            message: Some(format!("{err:#}")),
        }
    }
}

/// The first typed cause in the chain decides the code.
fn classify(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<KeywrapError>() {
            return match e {
                KeywrapError::InputError(_) | KeywrapError::SerializationError(_) => USAGE_ERROR,
                KeywrapError::CredentialNotFound { .. } | KeywrapError::NotFound(_) => {
                    CREDENTIAL_NOT_FOUND
                }
                KeywrapError::RegistryUnavailable(_) => REGISTRY_UNAVAILABLE,
                KeywrapError::CredentialAlreadyExists { .. } => CREDENTIAL_EXISTS,
                KeywrapError::DerivationError(_)
                | KeywrapError::RegistryRejected(_)
                | KeywrapError::CryptoError(_) => GENERAL_ERROR,
            };
        }
        if let Some(e) = cause.downcast_ref::<io::Error>() {
            return match e.kind() {
                io::ErrorKind::NotFound => INPUT_ERROR,
                _ => IO_ERROR,
            };
        }
    }
    GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn code_of(err: anyhow::Error) -> i32 {
        ExitCode::from_anyhow(&err).code
    }

    #[test]
    fn test_typed_errors_map_through_context() {
        let err: anyhow::Result<()> = Err(KeywrapError::CredentialNotFound {
            rp_id: "example.com".into(),
        })
        .context("Failed to recover credential");
        assert_eq!(code_of(err.unwrap_err()), CREDENTIAL_NOT_FOUND);

        let err = anyhow::Error::new(KeywrapError::RegistryUnavailable("timeout".into()));
        assert_eq!(code_of(err), REGISTRY_UNAVAILABLE);

        let err = anyhow::Error::new(KeywrapError::CredentialAlreadyExists {
            rp_id: "example.com".into(),
            credential_id: "00".into(),
        });
        assert_eq!(code_of(err), CREDENTIAL_EXISTS);

        let err = anyhow::Error::new(KeywrapError::InputError("bad rp".into()));
        assert_eq!(code_of(err), USAGE_ERROR);
    }

    #[test]
    fn test_io_errors() {
        let missing: anyhow::Result<()> =
            Err(io::Error::from(io::ErrorKind::NotFound)).context("Failed to read persona file");
        assert_eq!(code_of(missing.unwrap_err()), INPUT_ERROR);

        let denied: anyhow::Result<()> = Err(io::Error::from(io::ErrorKind::PermissionDenied))
            .context("Failed to write registry file");
        assert_eq!(code_of(denied.unwrap_err()), IO_ERROR);
    }

    #[test]
    fn test_untyped_error_is_general() {
        assert_eq!(code_of(anyhow::anyhow!("something odd")), GENERAL_ERROR);
    }

    #[test]
    fn test_message_includes_context_chain() {
        let err: anyhow::Result<()> =
            Err(KeywrapError::InputError("empty".into())).context("Invalid relying party");
        let exit = ExitCode::from_anyhow(&err.unwrap_err());
        let message = exit.message.unwrap();
        assert!(message.contains("Invalid relying party"));
        assert!(message.contains("empty"));
    }
}
