//! Vellum CLI: client-side key management and message sealing.
//!
//! Usage:
//!   vellum keygen       - Create an identity key pair
//!   vellum fingerprint  - Show a public key's fingerprint
//!   vellum seal         - Seal a message for recipients
//!   vellum open         - Open an envelope addressed to you

mod commands;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vellum")]
#[command(version)]
#[command(about = "End-to-end sealed messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new identity key pair
    Keygen {
        /// Identity id (random if omitted)
        #[arg(long)]
        id: Option<Uuid>,

        /// Directory to write `<id>.pub.pem` and `<id>.key.pem` into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Print the SHA-256 fingerprint of a public key
    Fingerprint {
        /// Public key PEM file
        public_key: PathBuf,
    },

    /// Seal a message and print the envelope set as JSON
    Seal {
        /// Recipient as `<id>=<public key PEM file>`; repeatable
        #[arg(long = "to", required = true, value_parser = commands::parse_recipient)]
        recipients: Vec<(Uuid, PathBuf)>,

        /// Plaintext file (stdin if omitted)
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },

    /// Open an envelope (or your entry of an envelope set) and print the
    /// plaintext
    Open {
        /// Your identity id
        #[arg(long)]
        id: Uuid,

        /// Your private key PEM file
        #[arg(long)]
        key: PathBuf,

        /// Envelope JSON file (stdin if omitted)
        #[arg(long = "in")]
        input: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Keygen { id, out } => {
            let created = commands::keygen(id.unwrap_or_else(Uuid::new_v4), &out)?;
            println!("Identity:    {}", created.id);
            println!("Public key:  {}", created.public_path.display());
            println!("Private key: {}", created.private_path.display());
            println!("Fingerprint: {}", created.fingerprint);
        }
        Commands::Fingerprint { public_key } => {
            println!("{}", commands::fingerprint(&public_key)?);
        }
        Commands::Seal { recipients, input } => {
            let plaintext = read_input_bytes(input.as_ref())?;
            println!("{}", commands::seal(&plaintext, &recipients)?);
        }
        Commands::Open { id, key, input } => {
            let json = read_input(input.as_ref())?;
            let plaintext = commands::open_opaque(&json, id, &key)?;
            std::io::stdout().write_all(&plaintext)?;
        }
    }
    Ok(())
}

fn read_input_bytes(path: Option<&PathBuf>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

fn read_input(path: Option<&PathBuf>) -> anyhow::Result<String> {
    String::from_utf8(read_input_bytes(path)?).context("input is not UTF-8")
}
