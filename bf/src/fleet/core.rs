//! Fleet orchestrator

use std::sync::Arc;

use eyre::Result;
use tracing::{error, info};

use crate::registry::TaskGroup;

use super::connection::Connection;
use super::handle::FleetHandle;

/// Composition root: brings the fleet up, reacts to shutdown
///
/// Thin by design - all per-connection policy lives in [`FleetHandle`] so
/// runtime events (bots added or toggled through the dialogue) go through
/// the exact same code path as startup.
pub struct Fleet {
    handle: Arc<FleetHandle>,
}

impl Fleet {
    pub fn new(handle: Arc<FleetHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<FleetHandle> {
        &self.handle
    }

    /// Fetch the fleet, start the primary plus every active secondary, and
    /// block until every task has drained
    ///
    /// A failed initial fetch is tolerated: the primary still comes up and a
    /// later refresh can fill the fleet in.
    pub async fn run(&self) -> Result<()> {
        if let Err(error) = self.handle.refresh().await {
            error!(%error, "initial fleet fetch failed, continuing with the primary only");
        }

        self.start_primary()?;

        let reports = self.handle.registry.run_all(false).await?;
        info!(tasks = reports.len(), "all fleet tasks drained");
        Ok(())
    }

    /// Register the primary connection and its maintenance task
    pub fn start_primary(&self) -> Result<()> {
        let telegram = &self.handle.config.telegram;
        let token = telegram.resolve_token()?;
        let transport = self.handle.transport_for(&token);
        let main_id = telegram.main_bot_id.clone();

        let connection = Connection::primary(&self.handle, transport);
        if self
            .handle
            .registry
            .add_task(main_id.clone(), TaskGroup::Connection, connection.run())
        {
            let limiter = self.handle.limiters.get(&main_id);
            self.handle
                .registry
                .add_task(main_id, TaskGroup::RateLimiter, async move {
                    limiter.periodic_check().await
                });
        }
        Ok(())
    }

    /// Cancel every registered task and wait for the unwind
    pub async fn shutdown(&self) -> Result<()> {
        for group in TaskGroup::ALL {
            for task_id in self.handle.registry.active_ids(group) {
                self.handle.registry.remove_task(&task_id, group);
            }
        }
        self.handle.registry.run_all(false).await?;
        info!("fleet stopped");
        Ok(())
    }
}
