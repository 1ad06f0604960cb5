//! ConversationStore implementation

use std::sync::Arc;

use botkv::KvStore;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// State tag meaning "no multi-step dialogue in progress"
pub const IDLE_STATE: &str = "idle";

/// One conversation's dialogue cursor
///
/// A missing record reads the same as the idle state with empty data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub state: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ConversationState {
    pub fn idle() -> Self {
        Self {
            state: IDLE_STATE.to_string(),
            data: Map::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == IDLE_STATE
    }
}

/// Shallow-merge `new` into `old`; keys in `new` win
fn merge_data(mut old: Map<String, Value>, new: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in new {
        old.insert(key, value);
    }
    old
}

/// Persists `(state, data)` per conversation in the key-value store
///
/// Mutation is always whole-record: a plain set replaces `data` entirely, an
/// update set shallow-merges into the existing record's `data`. Reset writes
/// the idle record rather than removing the key.
#[derive(Clone)]
pub struct ConversationStore {
    kv: Arc<KvStore>,
}

impl ConversationStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    fn key(conversation_id: i64) -> String {
        format!("conv:{conversation_id}:state")
    }

    /// Write the record for a conversation
    ///
    /// With `merge` set, the existing record's data (empty if none) is
    /// shallow-merged with `data`, new keys winning. `state` is always set
    /// to the given value either way.
    pub async fn set_state(
        &self,
        conversation_id: i64,
        state: &str,
        data: Map<String, Value>,
        merge: bool,
    ) -> Result<()> {
        let kv = self.kv.clone();
        let state = state.to_string();
        let key = Self::key(conversation_id);

        debug!(conversation = conversation_id, %state, merge, "advancing dialogue state");
        tokio::task::spawn_blocking(move || -> Result<(), botkv::KvError> {
            let data = if merge {
                let existing: Option<ConversationState> = kv.get_json(&key)?;
                merge_data(existing.map(|record| record.data).unwrap_or_default(), data)
            } else {
                data
            };
            kv.set_json(&key, &ConversationState { state, data })
        })
        .await
        .context("state write task panicked")??;

        Ok(())
    }

    /// Pure read; `None` when the conversation has no record
    pub async fn get_state(&self, conversation_id: i64) -> Result<Option<ConversationState>> {
        let kv = self.kv.clone();
        let key = Self::key(conversation_id);

        let record = tokio::task::spawn_blocking(move || kv.get_json::<ConversationState>(&key))
            .await
            .context("state read task panicked")??;
        Ok(record)
    }

    /// Clear back to idle, dropping all prior data
    pub async fn reset_state(&self, conversation_id: i64) -> Result<()> {
        self.set_state(conversation_id, IDLE_STATE, Map::new(), false).await
    }
}
