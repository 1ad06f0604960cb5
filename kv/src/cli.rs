//! CLI argument parsing for botkv

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default database location when `--db` is not given
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("botfleet")
        .join("kv.db")
}

#[derive(Parser, Debug)]
#[command(name = "bkv")]
#[command(author, version, about = "Inspect and edit the botfleet key-value store", long_about = None)]
pub struct Cli {
    /// Path to the sqlite database
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the JSON value stored under a key
    Get {
        #[arg(required = true)]
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        #[arg(required = true)]
        key: String,

        /// JSON text (validated before writing)
        #[arg(required = true)]
        value: String,
    },

    /// Delete a key
    Del {
        #[arg(required = true)]
        key: String,
    },

    /// List keys, optionally filtered by prefix
    Keys {
        #[arg(default_value = "")]
        prefix: String,
    },
}
