//! Rate limiter configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rate limiter configuration, one set of knobs for the whole fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Max sends per window before queuing kicks in
    #[serde(default = "default_messages_per_window", rename = "messages-per-window")]
    pub messages_per_window: u32,

    /// Window duration in seconds
    #[serde(default = "default_window_secs", rename = "window-secs")]
    pub window_secs: u64,
}

fn default_messages_per_window() -> u32 {
    25
}

fn default_window_secs() -> u64 {
    60
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            messages_per_window: default_messages_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

impl LimiterConfig {
    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LimiterConfig::default();
        assert_eq!(config.messages_per_window, 25);
        assert_eq!(config.window_secs, 60);
    }

    #[test]
    fn test_window_duration() {
        let config = LimiterConfig {
            window_secs: 120,
            ..Default::default()
        };
        assert_eq!(config.window(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: LimiterConfig = serde_yaml::from_str("messages-per-window: 5\n").unwrap();
        assert_eq!(config.messages_per_window, 5);
        assert_eq!(config.window_secs, 60);
    }
}
