//! Command-line client for exercising the ledger commit engine directly
//! against a SQLite-backed store, modeled on `cdk-cli`'s `clap`-derived
//! subcommand layout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use ledger_common::model::{AccountSide, TxMetadata};
use ledger_engine::{Ledger, RecoverConfig};
use ledger_sqlite::SqliteStore;
use tracing::Level;
use tracing_subscriber::EnvFilter;

const DEFAULT_DB_PATH: &str = "ledger.sqlite3";

#[derive(Parser)]
#[command(name = "ledger-cli", about = "Exercise the ledger commit engine from a shell", long_about = None)]
struct Cli {
    /// Path to the SQLite database file, created if it does not exist.
    #[arg(short, long, default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,
    /// Logging level.
    #[arg(short, long, default_value = "info")]
    log_level: Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account (create-if-absent).
    CreateAccount {
        /// Account id.
        id: String,
        /// `debit` or `credit`.
        #[arg(value_enum)]
        side: Side,
    },
    /// Print an account's current balance.
    Balance {
        /// Account id.
        id: String,
    },
    /// Begin a transaction, in `Initial` state, without committing it.
    Begin(TransferArgs),
    /// Promote and drive any `Initial` transaction through to `Done`.
    Commit,
    /// Begin and immediately commit the same transaction.
    Submit(TransferArgs),
    /// Run one recovery sweep over stale transactions.
    Recover {
        /// Minimum age, in seconds, before a stuck transaction is eligible.
        #[arg(long, default_value_t = 30)]
        staleness_secs: u64,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Side {
    Debit,
    Credit,
}

impl From<Side> for AccountSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Debit => AccountSide::Debit,
            Side::Credit => AccountSide::Credit,
        }
    }
}

#[derive(clap::Args)]
struct TransferArgs {
    /// A debit leg, as `account_id:amount`. May be repeated.
    #[arg(long = "debit", value_parser = parse_leg)]
    debit: Vec<(String, u64)>,
    /// A credit leg, as `account_id:amount`. May be repeated.
    #[arg(long = "credit", value_parser = parse_leg)]
    credit: Vec<(String, u64)>,
    /// Opaque caller reference, not interpreted by the ledger.
    #[arg(long)]
    ref1: Option<String>,
    /// Opaque caller reference, not interpreted by the ledger.
    #[arg(long)]
    ref2: Option<String>,
    /// Free-text description, not interpreted by the ledger.
    #[arg(long)]
    description: Option<String>,
}

fn parse_leg(s: &str) -> Result<(String, u64), String> {
    let (id, amount) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `account_id:amount`, got `{s}`"))?;
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("`{amount}` is not a valid amount"))?;
    Ok((id.to_string(), amount))
}

fn legs_to_map(legs: Vec<(String, u64)>) -> Result<BTreeMap<String, u64>> {
    let mut map = BTreeMap::new();
    for (id, amount) in legs {
        if map.insert(id.clone(), amount).is_some() {
            return Err(anyhow!("account `{id}` repeated within the same side"));
        }
    }
    Ok(map)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::new(cli.log_level.to_string());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = SqliteStore::new(&cli.db_path, 4).await?;
    let ledger = Ledger::new(Arc::new(store));

    match cli.command {
        Commands::CreateAccount { id, side } => {
            ledger.create_account(&id, side.into()).await?;
            println!("created account `{id}`");
        }
        Commands::Balance { id } => {
            let balance = ledger.read_balance(&id).await?;
            println!("{id}: {balance}");
        }
        Commands::Begin(args) => {
            let debit = legs_to_map(args.debit)?;
            let credit = legs_to_map(args.credit)?;
            let metadata = TxMetadata {
                ref1: args.ref1,
                ref2: args.ref2,
                description: args.description,
            };
            let id = ledger.begin_transaction(&debit, &credit, metadata).await?;
            println!("{id}");
        }
        Commands::Commit => {
            ledger.commit_transaction().await?;
            println!("ok");
        }
        Commands::Submit(args) => {
            let debit = legs_to_map(args.debit)?;
            let credit = legs_to_map(args.credit)?;
            let metadata = TxMetadata {
                ref1: args.ref1,
                ref2: args.ref2,
                description: args.description,
            };
            let id = ledger.submit(&debit, &credit, metadata).await?;
            println!("{id}");
        }
        Commands::Recover { staleness_secs } => {
            let config = RecoverConfig {
                staleness: Duration::from_secs(staleness_secs),
            };
            let outcome = ledger.recover(&config).await?;
            println!(
                "pending_recovered={} applied_recovered={}",
                outcome.pending_recovered, outcome.applied_recovered
            );
        }
    }

    Ok(())
}
