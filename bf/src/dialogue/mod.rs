//! Per-conversation dialogue state persistence
//!
//! A dialogue cursor, nothing more: handlers look up where a chat is in a
//! multi-step flow, act, and advance the cursor. Which transitions are legal
//! is the dispatch tables' business, not the store's.

mod store;

pub use store::{ConversationState, ConversationStore, IDLE_STATE};
