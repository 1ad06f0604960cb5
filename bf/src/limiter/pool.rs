//! Memoized per-connection limiter lookup

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::config::LimiterConfig;
use super::core::RateLimiter;

/// One limiter per connection identity, created lazily and kept for the
/// process lifetime
///
/// Instances are never evicted, even when a connection stops, so queued
/// operations and counters survive a stop/start cycle of the connection.
pub struct LimiterPool {
    config: LimiterConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterPool {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// The limiter for `connection_id`, creating it on first reference
    pub fn get(&self, connection_id: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().expect("limiter pool mutex poisoned");
        limiters
            .entry(connection_id.to_string())
            .or_insert_with(|| {
                debug!(connection = %connection_id, "creating rate limiter");
                Arc::new(RateLimiter::new(&self.config))
            })
            .clone()
    }

    /// Number of limiters created so far
    pub fn len(&self) -> usize {
        self.limiters.lock().expect("limiter pool mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
