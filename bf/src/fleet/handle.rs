//! FleetHandle - shared start/stop surface for the fleet
//!
//! Handlers react to runtime events (a bot created through the dialogue, a
//! stop/start toggle) by going through the same handle the orchestrator uses
//! at startup, so connection lifecycle policy lives in exactly one place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use botkv::KvStore;
use eyre::{Context, Result};
use tracing::{info, warn};

use crate::backend::BackendApi;
use crate::config::Config;
use crate::dialogue::ConversationStore;
use crate::domain::BotRecord;
use crate::limiter::LimiterPool;
use crate::registry::{TaskGroup, TaskRegistry};
use crate::transport::Transport;

use super::connection::Connection;

/// Builds a transport for a bot token; injected so tests can script the
/// provider
pub type TransportFactory = Arc<dyn Fn(&str) -> Arc<dyn Transport> + Send + Sync>;

pub struct FleetHandle {
    pub config: Config,
    pub registry: TaskRegistry,
    pub limiters: Arc<LimiterPool>,
    pub backend: Arc<dyn BackendApi>,
    pub conversations: ConversationStore,
    pub kv: Arc<KvStore>,
    transports: TransportFactory,

    /// Known secondary bots by id, as last fetched or created
    roster: Mutex<HashMap<String, BotRecord>>,
}

impl FleetHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        registry: TaskRegistry,
        limiters: Arc<LimiterPool>,
        backend: Arc<dyn BackendApi>,
        conversations: ConversationStore,
        kv: Arc<KvStore>,
        transports: TransportFactory,
    ) -> Self {
        Self {
            config,
            registry,
            limiters,
            backend,
            conversations,
            kv,
            transports,
            roster: Mutex::new(HashMap::new()),
        }
    }

    pub fn transport_for(&self, token: &str) -> Arc<dyn Transport> {
        (self.transports)(token)
    }

    pub fn remember(&self, bot: BotRecord) {
        let mut roster = self.roster.lock().expect("roster mutex poisoned");
        roster.insert(bot.id.clone(), bot);
    }

    pub fn roster_get(&self, bot_id: &str) -> Option<BotRecord> {
        let roster = self.roster.lock().expect("roster mutex poisoned");
        roster.get(bot_id).cloned()
    }

    /// All known secondary bots, sorted by id
    pub fn roster(&self) -> Vec<BotRecord> {
        let roster = self.roster.lock().expect("roster mutex poisoned");
        let mut bots: Vec<BotRecord> = roster.values().cloned().collect();
        bots.sort_by(|a, b| a.id.cmp(&b.id));
        bots
    }

    /// Start a secondary bot's connection, with its maintenance task tied to
    /// the same lifecycle
    ///
    /// Returns false when a connection for this bot is already registered.
    pub fn start_bot(self: &Arc<Self>, bot: &BotRecord) -> bool {
        let connection = Connection::secondary(self, bot);
        let added = self
            .registry
            .add_task(bot.id.clone(), TaskGroup::Connection, connection.run());

        if added {
            let limiter = self.limiters.get(&bot.id);
            let started = self
                .registry
                .add_task(bot.id.clone(), TaskGroup::RateLimiter, async move {
                    limiter.periodic_check().await
                });
            if !started {
                // the previous maintenance task is still unwinding; the
                // limiter instance is shared, so the connection reuses it
                warn!(bot = %bot.id, "limiter maintenance task already registered");
            }
            info!(bot = %bot.id, username = %bot.username, "connection registered");
        }
        added
    }

    /// Request teardown of a connection and its maintenance task
    ///
    /// Removal from the registry is eventual, once the loops have unwound.
    pub fn stop_bot(&self, bot_id: &str) -> bool {
        let removed = self.registry.remove_task(bot_id, TaskGroup::Connection);
        if removed {
            self.registry.remove_task(bot_id, TaskGroup::RateLimiter);
        }
        removed
    }

    /// Re-fetch the fleet, publish the snapshot, start newly-running bots
    ///
    /// `add_task`'s idempotent guard makes this safe to call while
    /// connections are already up.
    pub async fn refresh(self: &Arc<Self>) -> Result<()> {
        let bots = self.backend.list_bots(None).await?;
        info!(count = bots.len(), "fetched bots from backend");

        {
            let mut roster = self.roster.lock().expect("roster mutex poisoned");
            roster.clear();
            for bot in &bots {
                roster.insert(bot.id.clone(), bot.clone());
            }
        }

        self.publish_active_snapshot().await?;

        for bot in bots.iter().filter(|bot| bot.is_running) {
            self.start_bot(bot);
        }
        Ok(())
    }

    /// Publish the currently-active bot list for external observability
    pub async fn publish_active_snapshot(&self) -> Result<()> {
        let active: Vec<BotRecord> = self.roster().into_iter().filter(|bot| bot.is_running).collect();
        let kv = self.kv.clone();

        tokio::task::spawn_blocking(move || kv.set_json("fleet:active_bots", &active))
            .await
            .context("snapshot write task panicked")??;
        Ok(())
    }
}
