//! botkv - embedded key-value store with JSON values
//!
//! Backs botfleet's conversation state and the active-connection snapshot.
//! Values are stored as JSON text in a single sqlite table so that state
//! survives a process restart without any external service.
//!
//! # Example
//!
//! ```ignore
//! use botkv::KvStore;
//!
//! let kv = KvStore::open(".botfleet/kv.db")?;
//! kv.set_json("conv:42:state", &record)?;
//! let record: Option<Record> = kv.get_json("conv:42:state")?;
//! ```

pub mod cli;
mod store;

pub use store::{KvError, KvStore};
