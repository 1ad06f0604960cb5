//! One bot connection's message loop

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::domain::BotRecord;
use crate::limiter::RateLimiter;
use crate::telegram::Update;
use crate::transport::Transport;

use super::handle::FleetHandle;
use super::handlers::{Dispatch, HandlerCtx};

/// How long each long poll may hang waiting for traffic
const POLL_TIMEOUT: Duration = Duration::from_secs(50);

/// Base delay before retrying a failed poll
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// One independently running session against the messaging provider
///
/// Registered with the task registry under its bot id; runs until cancelled.
pub struct Connection {
    id: String,
    username: String,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    dispatch: Arc<Dispatch>,
    handle: Arc<FleetHandle>,
}

impl Connection {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        dispatch: Arc<Dispatch>,
        handle: Arc<FleetHandle>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            transport,
            limiter,
            dispatch,
            handle,
        }
    }

    /// The operator-facing primary connection with the full dialogue dispatch
    pub fn primary(handle: &Arc<FleetHandle>, transport: Arc<dyn Transport>) -> Self {
        let telegram = &handle.config.telegram;
        let limiter = handle.limiters.get(&telegram.main_bot_id);
        Self::new(
            telegram.main_bot_id.clone(),
            telegram.main_bot_username.clone(),
            transport,
            limiter,
            Dispatch::primary(),
            handle.clone(),
        )
    }

    /// A leased secondary connection with the minimal dispatch
    pub fn secondary(handle: &Arc<FleetHandle>, bot: &BotRecord) -> Self {
        let transport = handle.transport_for(&bot.token);
        let limiter = handle.limiters.get(&bot.id);
        Self::new(
            bot.id.clone(),
            bot.username.clone(),
            transport,
            limiter,
            Dispatch::secondary(),
            handle.clone(),
        )
    }

    /// Open the session and pump updates until cancelled
    ///
    /// Poll failures back off and retry; handler failures are logged and the
    /// loop keeps going. Only a failed `start` surfaces as a task failure.
    pub async fn run(self) -> Result<()> {
        self.transport.start().await?;
        info!(bot = %self.id, username = %self.username, "connection up");

        let ctx = Arc::new(HandlerCtx {
            conn_id: self.id.clone(),
            transport: self.transport.clone(),
            limiter: self.limiter.clone(),
            handle: self.handle.clone(),
        });

        let mut offset = 0i64;
        loop {
            match self.transport.poll_updates(offset, POLL_TIMEOUT).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(&ctx, update).await;
                    }
                }
                Err(error) => {
                    let jitter: u64 = rand::rng().random_range(0..1000);
                    let delay = RETRY_DELAY + Duration::from_millis(jitter);
                    warn!(bot = %self.id, %error, ?delay, "poll failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Route one inbound event through the dispatch tables
    ///
    /// Known command text wins outright; anything else is free text that
    /// advances whatever dialogue the chat is in, per the persisted state.
    async fn handle_update(&self, ctx: &Arc<HandlerCtx>, update: Update) {
        if let Some(message) = update.message {
            if let Some(text) = message.text.as_deref() {
                if let Some(handler) = self.dispatch.commands.get(text) {
                    debug!(bot = %self.id, chat = message.chat.id, command = text, "dispatching command");
                    if let Err(error) = handler(ctx.clone(), message).await {
                        warn!(bot = %self.id, %error, "command handler failed");
                    }
                    return;
                }
            }

            let chat_id = message.chat.id;
            let record = match ctx.conversations().get_state(chat_id).await {
                Ok(record) => record,
                Err(error) => {
                    warn!(bot = %self.id, chat = chat_id, %error, "state lookup failed, dropping update");
                    return;
                }
            };
            if let Some(record) = record {
                if let Some(handler) = self.dispatch.states.get(record.state.as_str()) {
                    debug!(bot = %self.id, chat = chat_id, state = %record.state, "dispatching state input");
                    if let Err(error) = handler(ctx.clone(), message).await {
                        warn!(bot = %self.id, %error, "state handler failed");
                    }
                }
            }
        } else if let Some(callback) = update.callback_query {
            if let Some(on_callback) = self.dispatch.callback {
                if let Err(error) = on_callback(ctx.clone(), callback).await {
                    warn!(bot = %self.id, %error, "callback handler failed");
                }
            }
        }
    }
}
