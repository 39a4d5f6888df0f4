//! estore - inspect and maintain an expiring note store from the shell
//!
//! The store location, backend and expiry policy come from the environment
//! (see `config.rs`); the subcommand picks the operation.

mod config;
mod error;
mod note;

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use expiring_store::{DiskStore, ExpiringStore, FileMedium, IndexedStore, JsonCodec, TimeSpec};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::{Backend, Config};
use crate::error::Result;
use crate::note::{validate_id, Note};

/// Expiring note store CLI.
#[derive(Parser)]
#[command(name = "estore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a note, replacing any note with the same id
    Put { id: String, body: String },

    /// Print a note if it exists and has not expired
    Get { id: String },

    /// Print every live note, newest first
    List {
        /// Print oldest first instead
        #[arg(long)]
        oldest_first: bool,
    },

    /// Print notes stored within the given span (e.g. 10m, 2h, 7d)
    Recent { span: TimeSpec },

    /// Print notes stored at least the given span ago
    Older { span: TimeSpec },

    /// Print the number of live notes
    Count,

    /// Delete notes by id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete every note
    Clear,

    /// Delete expired notes
    Sweep,
}

fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("expiring_store=info".parse()?)
        .add_directive("estore=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        backend = ?config.backend,
        store_dir = ?config.store_dir,
        store_name = %config.store_name,
        expiry = %config.expiry,
        "Opening store"
    );

    let store = open_store(&config)?;
    let stdout = io::stdout();
    run(&cli.command, store.as_ref(), &mut stdout.lock())
}

fn open_store(config: &Config) -> Result<Box<dyn ExpiringStore<Note>>> {
    match config.backend {
        Backend::Disk => {
            let store = DiskStore::<Note>::new(&config.store_dir, &config.store_name, config.expiry)
                .with_codec(JsonCodec::pretty());
            store.init()?;
            Ok(Box::new(store))
        }
        Backend::KeyValue => {
            let medium = FileMedium::open(&config.store_dir, &config.store_name)?;
            let store = IndexedStore::<Note, _>::new(medium, &config.store_name, config.expiry);
            store.init()?;
            Ok(Box::new(store))
        }
    }
}

fn run(command: &Command, store: &dyn ExpiringStore<Note>, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Put { id, body } => {
            store.put(Note::new(id, body)?)?;
        }
        Command::Get { id } => {
            let note = store.get(&validate_id(id)?)?;
            writeln!(out, "{}", serde_json::to_string(&note)?)?;
        }
        Command::List { oldest_first } => {
            print_notes(out, &store.get_all(!oldest_first)?)?;
        }
        Command::Recent { span } => {
            print_notes(out, &store.stored_in_last(*span)?)?;
        }
        Command::Older { span } => {
            print_notes(out, &store.stored_before(*span)?)?;
        }
        Command::Count => {
            writeln!(out, "{}", store.count())?;
        }
        Command::Delete { ids } => {
            let ids = ids
                .iter()
                .map(|id| validate_id(id))
                .collect::<Result<Vec<_>>>()?;
            store.delete_many(&ids)?;
        }
        Command::Clear => {
            store.delete_all()?;
        }
        Command::Sweep => {
            let purged = store.delete_expired()?;
            writeln!(out, "{purged}")?;
        }
    }
    Ok(())
}

fn print_notes(out: &mut impl Write, notes: &[Note]) -> Result<()> {
    for note in notes {
        writeln!(out, "{}", serde_json::to_string(note)?)?;
    }
    Ok(())
}
