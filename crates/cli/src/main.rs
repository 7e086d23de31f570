//! filegrant command line interface.
//!
//! Replays a JSON event snapshot into an in-memory ledger and answers the
//! access queries against the reconciled state. Useful for inspecting what a
//! captured event log resolves to without a live ledger connection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use filegrant_access::AccessQueryService;
use filegrant_ledger::MemoryLedger;
use filegrant_types::{Fingerprint, Principal};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "filegrant-cli")]
#[command(about = "Inspect access-grant state reconciled from an event snapshot", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a JSON event snapshot
    #[arg(long, value_name = "FILE")]
    events: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files registered by an owner
    Owned {
        /// Owner principal (0x-prefixed hex)
        #[arg(long)]
        owner: String,
    },
    /// List files currently shared with a principal
    SharedWith {
        /// Grantee principal (0x-prefixed hex)
        #[arg(long)]
        principal: String,
    },
    /// List active grants an owner has issued
    Issued {
        /// Owner principal (0x-prefixed hex)
        #[arg(long)]
        owner: String,
    },
    /// Check whether a grantee currently holds access to a file
    Check {
        /// Owner principal (0x-prefixed hex)
        #[arg(long)]
        owner: String,
        /// Content fingerprint of the file
        #[arg(long)]
        fingerprint: String,
        /// Grantee principal (0x-prefixed hex)
        #[arg(long)]
        grantee: String,
    },
}

/// One entry of the snapshot file. `block` closes the current sequence so
/// following events get a new sequence number.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SnapshotEvent {
    Register {
        owner: String,
        name: String,
        fingerprint: String,
    },
    Grant {
        owner: String,
        grantee: String,
        fingerprint: String,
    },
    Revoke {
        owner: String,
        grantee: String,
        fingerprint: String,
    },
    Block,
}

fn parse_principal(text: &str, role: &str) -> Result<Principal> {
    Principal::parse(text).with_context(|| format!("invalid {role} principal: {text}"))
}

fn load_snapshot(path: &PathBuf) -> Result<MemoryLedger> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let events: Vec<SnapshotEvent> =
        serde_json::from_str(&raw).context("failed to parse snapshot JSON")?;

    let ledger = MemoryLedger::new();
    for event in events {
        match event {
            SnapshotEvent::Register {
                owner,
                name,
                fingerprint,
            } => {
                let owner = parse_principal(&owner, "owner")?;
                ledger.register_file(&owner, &name, &Fingerprint::new(fingerprint));
            }
            SnapshotEvent::Grant {
                owner,
                grantee,
                fingerprint,
            } => {
                let owner = parse_principal(&owner, "owner")?;
                let grantee = parse_principal(&grantee, "grantee")?;
                ledger.grant_access(&owner, &Fingerprint::new(fingerprint), &grantee);
            }
            SnapshotEvent::Revoke {
                owner,
                grantee,
                fingerprint,
            } => {
                let owner = parse_principal(&owner, "owner")?;
                let grantee = parse_principal(&grantee, "grantee")?;
                ledger.revoke_access(&owner, &Fingerprint::new(fingerprint), &grantee);
            }
            SnapshotEvent::Block => ledger.advance_block(),
        }
    }
    Ok(ledger)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let ledger = load_snapshot(&cli.events)?;
    let service = AccessQueryService::new(Arc::new(ledger));

    match cli.command {
        Commands::Owned { owner } => {
            let owner = parse_principal(&owner, "owner")?;
            let files = service.files_owned_by(&owner).await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        Commands::SharedWith { principal } => {
            let principal = parse_principal(&principal, "grantee")?;
            let shared = service.files_shared_with(&principal).await?;
            println!("{}", serde_json::to_string_pretty(&shared)?);
        }
        Commands::Issued { owner } => {
            let owner = parse_principal(&owner, "owner")?;
            let issued = service.grants_issued_by(&owner).await?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        Commands::Check {
            owner,
            fingerprint,
            grantee,
        } => {
            let owner = parse_principal(&owner, "owner")?;
            let grantee = parse_principal(&grantee, "grantee")?;
            let allowed = service
                .has_access(&owner, &Fingerprint::new(fingerprint), &grantee)
                .await?;
            println!("{}", serde_json::json!({ "has_access": allowed }));
        }
    }

    Ok(())
}
