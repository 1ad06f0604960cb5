//! Dispatch tables and dialogue handlers
//!
//! Command text and state tags map to plain function pointers, resolved once
//! when a connection starts. All transition legality lives in these tables;
//! the conversation store just remembers where each chat is. Every outbound
//! reply or delete goes through the owning connection's rate limiter.

use std::collections::HashMap;
use std::sync::Arc;

use eyre::Result;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::backend::BackendApi;
use crate::dialogue::ConversationStore;
use crate::domain::BotRecord;
use crate::limiter::RateLimiter;
use crate::telegram::{CallbackQuery, Message, inline_keyboard, reply_keyboard};
use crate::transport::Transport;

use super::handle::FleetHandle;

/// Dialogue state tags for the primary connection
pub mod states {
    /// Account registration in progress
    pub const START: &str = "start";
    /// Waiting for a channel id
    pub const ENTER_CHANNEL_ID: &str = "enter_channel_id";
    /// Waiting for a channel name
    pub const ENTER_CHANNEL_NAME: &str = "enter_channel_name";
    /// Waiting for a bot token
    pub const ENTER_BOT_TOKEN: &str = "enter_bot_token";
    /// Waiting for the channel pick that completes add-bot
    pub const ASSIGN_CHANNEL: &str = "assign_channel_to_bot";
    /// Waiting for a start/stop pick in manage-bots
    pub const MANAGE_BOTS: &str = "manage_bots";
}

/// Menu button labels double as command tags in the dispatch table
pub mod commands {
    pub const START: &str = "/start";
    pub const MY_BOTS: &str = "My bots";
    pub const MY_CHANNELS: &str = "My channels";
    pub const ADD_CHANNEL: &str = "Add channel";
    pub const ADD_BOT: &str = "Add bot";
    pub const MANAGE_BOTS: &str = "Manage bots";
    pub const CANCEL: &str = "Cancel";
}

pub type MessageHandler = fn(Arc<HandlerCtx>, Message) -> BoxFuture<'static, Result<()>>;
pub type CallbackHandler = fn(Arc<HandlerCtx>, CallbackQuery) -> BoxFuture<'static, Result<()>>;

/// Everything a handler needs: the connection's transport and limiter plus
/// the shared fleet surface
pub struct HandlerCtx {
    pub conn_id: String,
    pub transport: Arc<dyn Transport>,
    pub limiter: Arc<RateLimiter>,
    pub handle: Arc<FleetHandle>,
}

impl HandlerCtx {
    pub fn conversations(&self) -> &ConversationStore {
        &self.handle.conversations
    }

    pub fn backend(&self) -> &dyn BackendApi {
        self.handle.backend.as_ref()
    }

    /// Queue-or-send a reply through this connection's limiter
    pub async fn reply(&self, chat_id: i64, text: impl Into<String>, reply_markup: Option<Value>) -> Result<()> {
        let transport = self.transport.clone();
        let text = text.into();
        self.limiter
            .respond(async move {
                transport.respond(chat_id, &text, reply_markup).await?;
                Ok(())
            })
            .await
    }

    /// Queue-or-delete a message through this connection's limiter
    pub async fn remove(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let transport = self.transport.clone();
        self.limiter
            .delete(async move {
                transport.delete(chat_id, message_id).await?;
                Ok(())
            })
            .await
    }
}

/// Static dispatch for one connection flavor
pub struct Dispatch {
    /// Exact command/button text to handler
    pub commands: HashMap<&'static str, MessageHandler>,
    /// Current dialogue state to the handler for free-text input
    pub states: HashMap<&'static str, MessageHandler>,
    /// Inline keyboard presses
    pub callback: Option<CallbackHandler>,
}

impl Dispatch {
    /// Full operator dialogue for the primary connection
    pub fn primary() -> Arc<Self> {
        let mut by_command: HashMap<&'static str, MessageHandler> = HashMap::new();
        by_command.insert(commands::START, |ctx, message| Box::pin(start(ctx, message)));
        by_command.insert(commands::MY_BOTS, |ctx, message| Box::pin(my_bots(ctx, message)));
        by_command.insert(commands::MY_CHANNELS, |ctx, message| Box::pin(my_channels(ctx, message)));
        by_command.insert(commands::ADD_CHANNEL, |ctx, message| Box::pin(add_channel(ctx, message)));
        by_command.insert(commands::ADD_BOT, |ctx, message| Box::pin(add_bot(ctx, message)));
        by_command.insert(commands::MANAGE_BOTS, |ctx, message| Box::pin(manage_bots(ctx, message)));
        by_command.insert(commands::CANCEL, |ctx, message| Box::pin(cancel(ctx, message)));

        let mut by_state: HashMap<&'static str, MessageHandler> = HashMap::new();
        by_state.insert(states::ENTER_CHANNEL_ID, |ctx, message| {
            Box::pin(channel_id_entered(ctx, message))
        });
        by_state.insert(states::ENTER_CHANNEL_NAME, |ctx, message| {
            Box::pin(channel_name_entered(ctx, message))
        });
        by_state.insert(states::ENTER_BOT_TOKEN, |ctx, message| {
            Box::pin(bot_token_entered(ctx, message))
        });

        Arc::new(Self {
            commands: by_command,
            states: by_state,
            callback: Some(|ctx, callback| Box::pin(on_callback(ctx, callback))),
        })
    }

    /// Minimal dispatch for leased secondary connections
    pub fn secondary() -> Arc<Self> {
        let mut by_command: HashMap<&'static str, MessageHandler> = HashMap::new();
        by_command.insert(commands::START, |ctx, message| Box::pin(leased_start(ctx, message)));
        by_command.insert("/status", |ctx, message| Box::pin(leased_status(ctx, message)));

        Arc::new(Self {
            commands: by_command,
            states: HashMap::new(),
            callback: None,
        })
    }
}

/// The persistent operator menu
fn main_menu() -> Value {
    reply_keyboard(&[
        &[commands::MY_BOTS, commands::MY_CHANNELS],
        &[commands::MANAGE_BOTS],
        &[commands::ADD_CHANNEL, commands::ADD_BOT],
    ])
}

fn cancel_menu() -> Value {
    reply_keyboard(&[&[commands::CANCEL]])
}

// ---------------------------------------------------------------------------
// Primary connection: commands
// ---------------------------------------------------------------------------

async fn start(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    ctx.conversations().set_state(chat_id, states::START, Map::new(), false).await?;

    let sender = message.from.as_ref();
    let name = sender.map(|user| user.display_name()).unwrap_or_default();
    let username = sender.and_then(|user| user.username.as_deref());

    match ctx.backend().register_account(chat_id, &name, username).await {
        Ok(true) => ctx.reply(chat_id, "Welcome aboard!", Some(main_menu())).await?,
        Ok(false) => ctx.reply(chat_id, "You are already registered.", Some(main_menu())).await?,
        Err(error) => {
            warn!(chat = chat_id, %error, "account registration failed");
            ctx.reply(chat_id, "Something went wrong, please try again later.", Some(main_menu()))
                .await?;
        }
    }

    ctx.conversations().reset_state(chat_id).await
}

async fn my_bots(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    match ctx.backend().list_bots(Some(chat_id)).await {
        Ok(bots) if bots.is_empty() => ctx.reply(chat_id, "You have no bots yet.", Some(main_menu())).await,
        Ok(bots) => {
            let listing = bots.iter().map(format_bot_line).collect::<Vec<_>>().join("\n");
            ctx.reply(chat_id, format!("Your bots:\n{listing}"), Some(main_menu())).await
        }
        Err(error) => {
            warn!(chat = chat_id, %error, "bot listing failed");
            ctx.reply(chat_id, "Could not load your bots right now.", Some(main_menu())).await
        }
    }
}

fn format_bot_line(bot: &BotRecord) -> String {
    let masked: String = bot.token.chars().take(8).chain("***".chars()).collect();
    let channel = bot.channel.as_ref().map(|c| c.name.as_str()).unwrap_or("-");
    format!("@{} | token {} | channel {}", bot.username, masked, channel)
}

async fn my_channels(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    match ctx.backend().list_channels(chat_id, false).await {
        Ok(channels) if channels.is_empty() => {
            ctx.reply(chat_id, "You have no channels yet.", Some(main_menu())).await
        }
        Ok(channels) => {
            let listing = channels
                .iter()
                .map(|channel| format!("{} | {}", channel.id, channel.name))
                .collect::<Vec<_>>()
                .join("\n");
            ctx.reply(chat_id, format!("Your channels:\n{listing}"), Some(main_menu())).await
        }
        Err(error) => {
            warn!(chat = chat_id, %error, "channel listing failed");
            ctx.reply(chat_id, "Could not load your channels right now.", Some(main_menu()))
                .await
        }
    }
}

async fn add_channel(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    ctx.conversations()
        .set_state(chat_id, states::ENTER_CHANNEL_ID, Map::new(), false)
        .await?;
    ctx.reply(chat_id, "Send the channel id:", Some(cancel_menu())).await
}

async fn add_bot(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    ctx.conversations()
        .set_state(chat_id, states::ENTER_BOT_TOKEN, Map::new(), false)
        .await?;
    ctx.reply(chat_id, "Send the bot token:", Some(cancel_menu())).await
}

async fn manage_bots(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let bots = match ctx.backend().list_bots(Some(chat_id)).await {
        Ok(bots) => bots,
        Err(error) => {
            warn!(chat = chat_id, %error, "bot listing failed");
            return ctx.reply(chat_id, "Could not load your bots right now.", Some(main_menu())).await;
        }
    };

    if bots.is_empty() {
        return ctx.reply(chat_id, "You have no bots to manage.", Some(main_menu())).await;
    }

    ctx.conversations()
        .set_state(chat_id, states::MANAGE_BOTS, Map::new(), false)
        .await?;

    let rows: Vec<Vec<(String, String)>> = bots
        .iter()
        .map(|bot| {
            let light = if bot.is_running { "on" } else { "off" };
            vec![(
                format!("@{} | {}", bot.username, light),
                format!("toggle:{}:{}", bot.id, if bot.is_running { 0 } else { 1 }),
            )]
        })
        .collect();
    ctx.reply(chat_id, "Pick a bot to start or stop:", Some(inline_keyboard(&rows)))
        .await
}

async fn cancel(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let record = ctx.conversations().get_state(chat_id).await?;
    let idle = record.as_ref().map(|r| r.is_idle()).unwrap_or(true);

    if idle {
        return ctx.reply(chat_id, "Nothing to cancel.", Some(main_menu())).await;
    }
    ctx.conversations().reset_state(chat_id).await?;
    ctx.reply(chat_id, "Cancelled.", Some(main_menu())).await
}

// ---------------------------------------------------------------------------
// Primary connection: state input
// ---------------------------------------------------------------------------

async fn channel_id_entered(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(text) = message.text else { return Ok(()) };

    let mut data = Map::new();
    data.insert("channel_id".to_string(), Value::String(text));
    ctx.conversations()
        .set_state(chat_id, states::ENTER_CHANNEL_NAME, data, true)
        .await?;
    ctx.reply(chat_id, "Now send the channel name:", Some(cancel_menu())).await
}

async fn channel_name_entered(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(name) = message.text else { return Ok(()) };

    let record = ctx.conversations().get_state(chat_id).await?;
    let data = record.map(|r| r.data).unwrap_or_default();
    let channel_id = data
        .get("channel_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match ctx.backend().add_channel(&channel_id, &name, chat_id).await {
        Ok(()) => ctx.reply(chat_id, "Channel added!", Some(main_menu())).await?,
        Err(error) => {
            warn!(chat = chat_id, %error, "add channel failed");
            ctx.reply(chat_id, "Could not add the channel.", Some(main_menu())).await?;
        }
    }
    ctx.conversations().reset_state(chat_id).await
}

async fn bot_token_entered(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(token) = message.text else { return Ok(()) };

    let api_base = ctx.handle.config.telegram.api_base.clone();
    let profile = match ctx.backend().validate_bot_token(&api_base, &token).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            ctx.reply(chat_id, "That token does not belong to a bot.", Some(main_menu())).await?;
            return ctx.conversations().reset_state(chat_id).await;
        }
        Err(error) => {
            warn!(chat = chat_id, %error, "token validation failed");
            ctx.reply(chat_id, "Could not verify the token right now.", Some(main_menu())).await?;
            return ctx.conversations().reset_state(chat_id).await;
        }
    };

    let mut data = Map::new();
    data.insert("bot_token".to_string(), Value::String(token));
    data.insert("bot_id".to_string(), json!(profile.id));
    data.insert("bot_name".to_string(), Value::String(profile.first_name.clone()));
    data.insert(
        "bot_username".to_string(),
        Value::String(profile.username.clone().unwrap_or_default()),
    );
    ctx.conversations()
        .set_state(chat_id, states::ASSIGN_CHANNEL, data, true)
        .await?;

    let channels = match ctx.backend().list_channels(chat_id, true).await {
        Ok(channels) => channels,
        Err(error) => {
            warn!(chat = chat_id, %error, "channel listing failed");
            ctx.reply(chat_id, "Could not load your channels right now.", Some(main_menu())).await?;
            return ctx.conversations().reset_state(chat_id).await;
        }
    };
    if channels.is_empty() {
        ctx.reply(chat_id, "You have no free channels. Add a channel first.", Some(main_menu()))
            .await?;
        return ctx.conversations().reset_state(chat_id).await;
    }

    let rows: Vec<Vec<(String, String)>> = channels
        .iter()
        .map(|channel| {
            vec![(
                channel.name.clone(),
                format!("assign:{}:{}", profile.id, channel.id),
            )]
        })
        .collect();
    ctx.reply(chat_id, "Pick a channel to attach the bot to:", Some(inline_keyboard(&rows)))
        .await
}

// ---------------------------------------------------------------------------
// Primary connection: inline keyboard callbacks
// ---------------------------------------------------------------------------

async fn on_callback(ctx: Arc<HandlerCtx>, callback: CallbackQuery) -> Result<()> {
    // the chat comes from the message the keyboard was attached to
    let Some(message) = callback.message else { return Ok(()) };
    let chat_id = message.chat.id;
    let data = callback.data.unwrap_or_default();
    let parts: Vec<&str> = data.split(':').collect();

    let record = ctx.conversations().get_state(chat_id).await?;
    let state = record.as_ref().map(|r| r.state.as_str()).unwrap_or(crate::dialogue::IDLE_STATE);

    match parts.as_slice() {
        ["assign", bot_id, channel_id] if state == states::ASSIGN_CHANNEL => {
            let mut picked = Map::new();
            picked.insert("bot_id".to_string(), json!(bot_id));
            picked.insert("channel_id".to_string(), json!(channel_id));
            ctx.conversations()
                .set_state(chat_id, states::ASSIGN_CHANNEL, picked, true)
                .await?;

            ctx.reply(chat_id, "Channel selected.", None).await?;
            complete_add_bot(&ctx, chat_id).await
        }
        ["toggle", bot_id, flag] if state == states::MANAGE_BOTS => {
            toggle_bot(&ctx, chat_id, message.message_id, bot_id, *flag == "1").await
        }
        _ => {
            // stale or unknown keyboard: drop it and park the dialogue
            ctx.remove(chat_id, message.message_id).await?;
            ctx.conversations().reset_state(chat_id).await
        }
    }
}

/// Create the bot at the backend from the collected dialogue data, then hot
/// start its connection
async fn complete_add_bot(ctx: &Arc<HandlerCtx>, chat_id: i64) -> Result<()> {
    let record = ctx.conversations().get_state(chat_id).await?;
    let data = record.map(|r| r.data).unwrap_or_default();

    let payload = json!({
        "id": data.get("bot_id").cloned().unwrap_or(Value::Null),
        "name": data.get("bot_name").cloned().unwrap_or(Value::Null),
        "token": data.get("bot_token").cloned().unwrap_or(Value::Null),
        "username": data.get("bot_username").cloned().unwrap_or(Value::Null),
        "channel_id": data.get("channel_id").cloned().unwrap_or(Value::Null),
        "owner": chat_id,
    });

    match ctx.backend().add_bot(payload).await {
        Ok(bot) => {
            ctx.handle.remember(bot.clone());
            if ctx.handle.start_bot(&bot) {
                info!(bot = %bot.id, "new bot connection started");
            }
            ctx.reply(chat_id, "Bot added!", Some(main_menu())).await?;
        }
        Err(error) => {
            warn!(chat = chat_id, %error, "add bot failed");
            ctx.reply(chat_id, "Could not add the bot.", Some(main_menu())).await?;
        }
    }
    ctx.conversations().reset_state(chat_id).await
}

/// Flip a bot at the backend, then align the running connection with it
async fn toggle_bot(
    ctx: &Arc<HandlerCtx>,
    chat_id: i64,
    keyboard_message_id: i64,
    bot_id: &str,
    run: bool,
) -> Result<()> {
    match ctx.backend().set_bot_running(bot_id, run).await {
        Ok(updated) => {
            let line = if run {
                format!("Bot @{} started.", updated.username)
            } else {
                format!("Bot @{} stopped.", updated.username)
            };
            ctx.reply(chat_id, line, Some(main_menu())).await?;

            if run {
                // the PATCH body may omit the token; the roster has it
                match ctx.handle.roster_get(bot_id) {
                    Some(mut known) => {
                        known.is_running = true;
                        ctx.handle.remember(known.clone());
                        ctx.handle.start_bot(&known);
                    }
                    None => warn!(bot = %bot_id, "bot missing from roster, cannot start it"),
                }
            } else {
                ctx.handle.stop_bot(bot_id);
                if let Some(mut known) = ctx.handle.roster_get(bot_id) {
                    known.is_running = false;
                    ctx.handle.remember(known);
                }
            }

            ctx.remove(chat_id, keyboard_message_id).await?;
        }
        Err(error) => {
            warn!(chat = chat_id, bot = %bot_id, %error, "bot status update failed");
            ctx.reply(chat_id, "Could not update the bot right now.", Some(main_menu())).await?;
        }
    }
    ctx.conversations().reset_state(chat_id).await
}

// ---------------------------------------------------------------------------
// Secondary connections
// ---------------------------------------------------------------------------

async fn leased_start(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    ctx.reply(message.chat.id, "This bot is managed by botfleet and ready to go.", None)
        .await
}

async fn leased_status(ctx: Arc<HandlerCtx>, message: Message) -> Result<()> {
    let stats = ctx.limiter.stats().await;
    ctx.reply(
        message.chat.id,
        format!(
            "Connection {} is up. {} messages sent in total, {} queued.",
            ctx.conn_id, stats.total_sent, stats.queued
        ),
        None,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_dispatch_covers_all_menu_commands() {
        let dispatch = Dispatch::primary();

        for command in [
            commands::START,
            commands::MY_BOTS,
            commands::MY_CHANNELS,
            commands::ADD_CHANNEL,
            commands::ADD_BOT,
            commands::MANAGE_BOTS,
            commands::CANCEL,
        ] {
            assert!(dispatch.commands.contains_key(command), "missing {command}");
        }
        assert!(dispatch.callback.is_some());
    }

    #[test]
    fn test_primary_dispatch_covers_input_states() {
        let dispatch = Dispatch::primary();

        for state in [states::ENTER_CHANNEL_ID, states::ENTER_CHANNEL_NAME, states::ENTER_BOT_TOKEN] {
            assert!(dispatch.states.contains_key(state), "missing {state}");
        }
        // picks arrive as callbacks, not free text
        assert!(!dispatch.states.contains_key(states::ASSIGN_CHANNEL));
        assert!(!dispatch.states.contains_key(states::MANAGE_BOTS));
    }

    #[test]
    fn test_secondary_dispatch_is_minimal() {
        let dispatch = Dispatch::secondary();

        assert!(dispatch.commands.contains_key(commands::START));
        assert!(dispatch.states.is_empty());
        assert!(dispatch.callback.is_none());
    }

    #[test]
    fn test_bot_line_masks_token() {
        let bot = BotRecord {
            id: "201".to_string(),
            token: "201:verysecrettoken".to_string(),
            username: "echo_bot".to_string(),
            owner: None,
            is_running: true,
            channel: None,
        };

        let line = format_bot_line(&bot);
        assert!(line.contains("@echo_bot"));
        assert!(!line.contains("verysecrettoken"));
    }
}
