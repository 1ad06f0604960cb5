//! Bot API client over HTTP long polling

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::types::Update;
use crate::transport::{Transport, TransportError};

/// Envelope every Bot API response arrives in
#[derive(Debug, serde::Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API transport for one token
pub struct BotApi {
    http: Client,
    base: String,
}

impl BotApi {
    /// Client must carry a timeout larger than the long-poll window
    pub fn new(http: Client, api_base: &str, token: &str) -> Self {
        Self {
            http,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        }
    }

    async fn call<T: DeserializeOwned + Default>(&self, method: &str, body: Value) -> Result<T, TransportError> {
        let url = format!("{}/{}", self.base, method);
        let response = self.http.post(&url).json(&body).send().await?;
        let envelope: ApiResponse<T> = response.json().await?;

        if !envelope.ok {
            return Err(TransportError::Api {
                description: envelope.description.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        envelope
            .result
            .ok_or_else(|| TransportError::InvalidResponse(format!("{method}: missing result")))
    }
}

#[async_trait]
impl Transport for BotApi {
    async fn start(&self) -> Result<(), TransportError> {
        let me: Value = self.call("getMe", json!({})).await?;
        debug!(username = ?me.get("username"), "session validated");
        Ok(())
    }

    async fn poll_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn respond(&self, chat_id: i64, text: &str, reply_markup: Option<Value>) -> Result<(), TransportError> {
        let mut body = json!({"chat_id": chat_id, "text": text});
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let _sent: Value = self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        let _deleted: Value = self
            .call("deleteMessage", json!({"chat_id": chat_id, "message_id": message_id}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let api = BotApi::new(Client::new(), "https://api.telegram.org/", "42:token");
        assert_eq!(api.base, "https://api.telegram.org/bot42:token");
    }

    #[test]
    fn test_error_envelope_parses() {
        let envelope: ApiResponse<Value> = serde_json::from_value(json!({
            "ok": false,
            "description": "Unauthorized"
        }))
        .unwrap();

        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_result_envelope_parses() {
        let envelope: ApiResponse<Vec<Update>> = serde_json::from_value(json!({
            "ok": true,
            "result": [{"update_id": 1}]
        }))
        .unwrap();

        assert!(envelope.ok);
        assert_eq!(envelope.result.unwrap().len(), 1);
    }
}
