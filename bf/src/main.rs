//! botfleet - multi-connection bot fleet daemon
//!
//! CLI entry point: wires config, storage, registry, limiters, and the
//! fleet, then blocks until the process is terminated.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{error, info, warn};

use botfleet::backend::HttpBackend;
use botfleet::cli::{Cli, Command};
use botfleet::config::Config;
use botfleet::dialogue::ConversationStore;
use botfleet::fleet::{Fleet, FleetHandle, TransportFactory};
use botfleet::limiter::LimiterPool;
use botfleet::registry::TaskRegistry;
use botfleet::telegram::BotApi;
use botfleet::transport::Transport;

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_fleet(config).await,
    }
}

async fn run_fleet(config: Config) -> Result<()> {
    info!(backend = %config.backend.base_url, "botfleet starting");

    let kv = Arc::new(botkv::KvStore::open(&config.storage.kv_path).context("Failed to open key-value store")?);
    let conversations = ConversationStore::new(kv.clone());
    let registry = TaskRegistry::new();
    let limiters = Arc::new(LimiterPool::new(config.limits.clone()));
    let backend = Arc::new(HttpBackend::new(&config.backend.base_url)?);

    // one HTTP client for every connection; timeout rides above the long poll
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(75))
        .build()
        .context("Failed to build HTTP client")?;
    let api_base = config.telegram.api_base.clone();
    let transports: TransportFactory =
        Arc::new(move |token: &str| Arc::new(BotApi::new(http.clone(), &api_base, token)) as Arc<dyn Transport>);

    let handle = Arc::new(FleetHandle::new(
        config,
        registry,
        limiters,
        backend,
        conversations,
        kv,
        transports,
    ));
    let fleet = Fleet::new(handle.clone());

    // SIGHUP refreshes the fleet; SIGINT/SIGTERM shut it down
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        {
            let run = fleet.run();
            tokio::pin!(run);

            loop {
                tokio::select! {
                    result = &mut run => {
                        result?;
                        return Ok(());
                    }
                    _ = sighup.recv() => {
                        info!("SIGHUP received - refreshing fleet");
                        if let Err(e) = handle.refresh().await {
                            error!(error = %e, "fleet refresh failed");
                        }
                    }
                    _ = sigint.recv() => {
                        warn!("SIGINT received");
                        break;
                    }
                    _ = sigterm.recv() => {
                        warn!("SIGTERM received");
                        break;
                    }
                }
            }
        }

        info!("shutting down...");
        fleet.shutdown().await?;
    }

    #[cfg(not(unix))]
    {
        {
            let run = fleet.run();
            tokio::pin!(run);

            tokio::select! {
                result = &mut run => {
                    result?;
                    return Ok(());
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Ctrl+C received");
                }
            }
        }

        info!("shutting down...");
        fleet.shutdown().await?;
    }

    Ok(())
}
