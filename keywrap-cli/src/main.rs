//! Keywrap CLI - stateless WebAuthn credentials from a persona keypair.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use keywrap_core::{CredentialId, CredentialIdBinding};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Invalid input (arguments, relying party id, persona file)
  65  No stored credential could be unwrapped
  66  Input file not found
  69  Registry unavailable
  73  Credential already exists (exclusion list hit)
  74  I/O error writing output";

#[derive(Parser)]
#[command(name = "keywrap")]
#[command(author, version, about = "Stateless WebAuthn credentials from a persona keypair", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Print only the essential value (ids, keys), no decoration
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// Registry file encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Cbor,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new persona and write it as a private JWK
    Keygen {
        /// Where to write the persona
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the credential id a persona derives for a relying party
    DeriveId {
        /// Persona JWK file
        #[arg(short, long, value_name = "FILE")]
        persona: PathBuf,

        /// Relying party id (a DNS name)
        #[arg(long, value_name = "RP")]
        rp: String,
    },

    /// Create a credential and publish it to the registry
    Create {
        /// Persona JWK file
        #[arg(short, long, value_name = "FILE")]
        persona: PathBuf,

        /// Registry file (created when missing)
        #[arg(short, long, value_name = "FILE")]
        registry: PathBuf,

        /// Relying party id (a DNS name)
        #[arg(long, value_name = "RP")]
        rp: String,

        /// Credential ids the relying party already knows (base64url)
        #[arg(long = "exclude", value_name = "ID", value_parser = utils::parse_credential_id)]
        exclude: Vec<CredentialId>,

        /// Registry file format (defaults to the existing file's format, else cbor)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// What the credential id is derived from
        #[arg(long, value_name = "BINDING", value_parser = parse_binding)]
        bind: Option<CredentialIdBinding>,
    },

    /// Recover a credential's key pair from the registry
    Get {
        /// Persona JWK file
        #[arg(short, long, value_name = "FILE")]
        persona: PathBuf,

        /// Registry file
        #[arg(short, long, value_name = "FILE")]
        registry: PathBuf,

        /// Relying party id (a DNS name)
        #[arg(long, value_name = "RP")]
        rp: String,

        /// Candidate credential ids offered by the relying party (base64url)
        #[arg(long = "credential", value_name = "ID", required = true, value_parser = utils::parse_credential_id)]
        credentials: Vec<CredentialId>,
    },

    /// Show the resident credential for a relying party
    Resident {
        /// Persona JWK file
        #[arg(short, long, value_name = "FILE")]
        persona: PathBuf,

        /// Relying party id (a DNS name)
        #[arg(long, value_name = "RP")]
        rp: String,
    },

    /// Read or advance a credential's sign counter
    Counter {
        /// Registry file
        #[arg(short, long, value_name = "FILE")]
        registry: PathBuf,

        /// Credential id (base64url)
        #[arg(long, value_name = "ID", value_parser = utils::parse_credential_id)]
        credential: CredentialId,

        /// Increment the counter and save the registry
        #[arg(long)]
        increment: bool,
    },
}

fn parse_binding(s: &str) -> std::result::Result<CredentialIdBinding, String> {
    s.parse().map_err(|e: keywrap_core::KeywrapError| e.to_string())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "keywrap_core=debug,keywrap=debug,info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;

    match cli.command {
        Commands::Keygen { out, force } => commands::keygen::execute(out, force, quiet).await,
        Commands::DeriveId { persona, rp } => commands::derive_id::execute(persona, rp, quiet).await,
        Commands::Create {
            persona,
            registry,
            rp,
            exclude,
            format,
            bind,
        } => commands::create::execute(persona, registry, rp, exclude, format, bind, quiet).await,
        Commands::Get {
            persona,
            registry,
            rp,
            credentials,
        } => commands::get::execute(persona, registry, rp, credentials, quiet).await,
        Commands::Resident { persona, rp } => commands::resident::execute(persona, rp, quiet).await,
        Commands::Counter {
            registry,
            credential,
            increment,
        } => commands::counter::execute(registry, credential, increment, quiet).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }

    init_tracing(cli.verbose, cli.quiet);

    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
