//! Telegram Bot API transport
//!
//! HTTP implementation of the [`crate::transport::Transport`] seam: getMe to
//! open the session, long-polled getUpdates for inbound traffic, sendMessage
//! and deleteMessage outbound. Only the slice of the wire format the fleet
//! actually touches is modeled.

mod client;
mod types;

pub use client::BotApi;
pub use types::{CallbackQuery, Chat, Message, Update, User, inline_keyboard, reply_keyboard};
