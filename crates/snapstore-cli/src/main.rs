//! Snapstore CLI
//!
//! Command-line interface over one collection of a snapstore database

use clap::{Parser, Subcommand};
use snapstore::logging_facility::{self, Profile};
use snapstore::ErrorKind;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "snapstore")]
#[command(about = "Snapstore - versioned snapshot store", long_about = None)]
struct Cli {
    /// SQLite database file (overrides the config file and SNAPSTORE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML client configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "default")]
    collection: String,

    /// Log to stderr: pretty or json
    #[arg(long, global = true)]
    log_format: Option<Profile>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Append a version of an entity
    AddVersion(commands::write::AddVersionArgs),
    /// Promote an affinity's latest version to the current snapshot
    Promote(commands::write::PromoteArgs),
    /// Print the current snapshot payload
    Get(commands::read::GetArgs),
    /// Print an affinity's latest version payload
    GetVersion(commands::read::GetVersionArgs),
    /// Stream current snapshot payloads, one JSON document per line
    List(commands::read::ListArgs),
    /// Print the snapshot timeline of an entity
    History(commands::read::GetArgs),
    /// Print every version of an entity
    Versions(commands::read::GetArgs),
}

/// Process exit code for a failed command
fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Conflict => 3,
        ErrorKind::NotFound => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(profile) = cli.log_format {
        logging_facility::init(profile);
    }

    let target = commands::Target {
        db: cli.db,
        config: cli.config,
        collection: cli.collection,
    };

    let result = match cli.command {
        Commands::AddVersion(args) => commands::write::add_version(&target, args),
        Commands::Promote(args) => commands::write::promote(&target, args),
        Commands::Get(args) => commands::read::get(&target, args),
        Commands::GetVersion(args) => commands::read::get_version(&target, args),
        Commands::List(args) => commands::read::list(&target, args),
        Commands::History(args) => commands::read::history(&target, args),
        Commands::Versions(args) => commands::read::versions(&target, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.kind()));
    }
}
