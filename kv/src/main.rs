use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};

use botkv::KvStore;
use botkv::cli::{Cli, Command, default_db_path};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let kv = KvStore::open(&db_path).context("Failed to open key-value store")?;

    match cli.command {
        Command::Get { key } => match kv.get_raw(&key)? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("{} no such key: {}", "✗".red(), key.yellow());
                std::process::exit(1);
            }
        },
        Command::Set { key, value } => {
            let parsed: serde_json::Value =
                serde_json::from_str(&value).map_err(|e| eyre!("not valid JSON: {}", e))?;
            kv.set_json(&key, &parsed)?;
            println!("{} {}", "✓".green(), key.cyan());
        }
        Command::Del { key } => {
            if kv.delete(&key)? {
                println!("{} deleted: {}", "✓".green(), key.cyan());
            } else {
                eprintln!("{} no such key: {}", "✗".red(), key.yellow());
                std::process::exit(1);
            }
        }
        Command::Keys { prefix } => {
            let keys = kv.keys(&prefix)?;
            if keys.is_empty() {
                println!("No keys found");
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
        }
    }

    Ok(())
}
