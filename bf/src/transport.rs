//! Messaging transport seam
//!
//! The core treats the messaging provider as an opaque collaborator: open a
//! session, pull inbound updates, send a reply, remove a message. The fleet
//! only ever holds `Arc<dyn Transport>`, so tests substitute a scripted
//! implementation and the daemon binds the Bot API client from
//! [`crate::telegram`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::telegram::Update;

/// Errors from the messaging transport
///
/// Opaque to the core: callers log them and fall back, they never crash the
/// owning connection loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("provider rejected the call: {description}")]
    Api { description: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One bot connection's view of the messaging provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// Validate credentials and open the session
    async fn start(&self) -> Result<(), TransportError>;

    /// Long-poll for the next batch of inbound updates
    ///
    /// `offset` acknowledges everything before it; the call may hang up to
    /// `timeout` waiting for traffic.
    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TransportError>;

    /// Send a reply into a conversation
    async fn respond(&self, chat_id: i64, text: &str, reply_markup: Option<Value>) -> Result<(), TransportError>;

    /// Remove a previously sent message
    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError>;
}
