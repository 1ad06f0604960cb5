//! Serde subset of the Bot API objects the fleet touches

use serde::Deserialize;
use serde_json::{Value, json};

/// One inbound event from getUpdates
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// First name, plus the last name when there is one
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// An inline keyboard button press
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message the keyboard was attached to
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Persistent reply keyboard from rows of button labels
pub fn reply_keyboard(rows: &[&[&str]]) -> Value {
    json!({
        "keyboard": rows
            .iter()
            .map(|row| row.iter().map(|label| json!({"text": label})).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
        "resize_keyboard": true,
    })
}

/// Inline keyboard from rows of (label, callback data) pairs
pub fn inline_keyboard(rows: &[Vec<(String, String)>]) -> Value {
    json!({
        "inline_keyboard": rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(text, data)| json!({"text": text, "callback_data": data}))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_with_message_parses() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "chat": {"id": 42},
                "from": {"id": 9, "first_name": "Ann", "username": "ann"},
                "text": "/start"
            }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.text.as_deref(), Some("/start"));
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn test_update_with_callback_parses() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 9, "first_name": "Ann"},
                "message": {"message_id": 6, "chat": {"id": 42}},
                "data": "assign:201:-100"
            }
        }))
        .unwrap();

        let callback = update.callback_query.unwrap();
        assert_eq!(callback.data.as_deref(), Some("assign:201:-100"));
        assert_eq!(callback.message.unwrap().chat.id, 42);
    }

    #[test]
    fn test_display_name_with_and_without_last_name() {
        let full: User = serde_json::from_value(json!({"id": 1, "first_name": "Ann", "last_name": "Lee"})).unwrap();
        let short: User = serde_json::from_value(json!({"id": 2, "first_name": "Bo"})).unwrap();

        assert_eq!(full.display_name(), "Ann Lee");
        assert_eq!(short.display_name(), "Bo");
    }

    #[test]
    fn test_reply_keyboard_shape() {
        let markup = reply_keyboard(&[&["A", "B"], &["C"]]);

        assert_eq!(markup["resize_keyboard"], json!(true));
        assert_eq!(markup["keyboard"][0][1]["text"], json!("B"));
        assert_eq!(markup["keyboard"][1][0]["text"], json!("C"));
    }

    #[test]
    fn test_inline_keyboard_shape() {
        let markup = inline_keyboard(&[vec![("news".to_string(), "assign:1:-100".to_string())]]);

        assert_eq!(markup["inline_keyboard"][0][0]["text"], json!("news"));
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], json!("assign:1:-100"));
    }
}
