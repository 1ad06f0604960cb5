//! Backend payload types

use serde::{Deserialize, Serialize};

/// Tenant account that owns bots and channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// One managed bot as the backend describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRecord {
    /// Stable connection identity
    pub id: String,

    /// Provider credential; may be absent in partial payloads
    #[serde(default)]
    pub token: String,

    pub username: String,

    #[serde(default)]
    pub owner: Option<OwnerRecord>,

    /// Whether the backend wants a live connection for this bot
    #[serde(default)]
    pub is_running: bool,

    /// Channel the bot is attached to, if any
    #[serde(default)]
    pub channel: Option<ChannelRecord>,
}

/// A channel a bot can be attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
}

/// Provider profile returned when validating a bot token
#[derive(Debug, Clone, Deserialize)]
pub struct BotProfile {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bot_record_parses_full_payload() {
        let bot: BotRecord = serde_json::from_value(serde_json::json!({
            "id": "201",
            "token": "201:abc",
            "username": "echo_bot",
            "owner": {"id": 42, "name": "Ann", "username": "ann"},
            "is_running": true,
            "channel": {"id": "-100", "name": "announcements"}
        }))
        .unwrap();

        assert_eq!(bot.id, "201");
        assert!(bot.is_running);
        assert_eq!(bot.channel.unwrap().name, "announcements");
    }

    #[test]
    fn test_bot_record_tolerates_partial_payload() {
        let bot: BotRecord = serde_json::from_value(serde_json::json!({
            "id": "202",
            "username": "quiet_bot"
        }))
        .unwrap();

        assert_eq!(bot.token, "");
        assert!(!bot.is_running);
        assert!(bot.owner.is_none());
    }
}
