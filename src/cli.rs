//! CLI dispatcher. Thin: no interactive prompts, no progress-bar
//! rendering. `--json` toggles between a pretty debug dump and
//! serialized JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "dialog-migrator",
    about = "Migrates a chat account's conversation history into per-conversation destination supergroups"
)]
pub struct Cli {
    /// Path to the TOML config file (defaults to ./migration.toml if present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit JSON instead of a pretty debug dump.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the migration.
    Migrate {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        dialog: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Print the current progress summary.
    Status,
    /// List known conversations, optionally filtered by type.
    List {
        #[arg(long = "type")]
        conversation_type: Option<String>,
    },
    /// Clear progress for one or more dialogs, or the whole store.
    Reset {
        #[arg(long)]
        dialog: Vec<String>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        force: bool,
    },
    /// Write the wrapped export envelope to `path`.
    Export { path: PathBuf },
    /// Read an export (wrapped or bare) and merge it with `OverwriteAll`.
    Import { path: PathBuf },
}
