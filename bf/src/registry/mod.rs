//! Task registry for background loops
//!
//! Every long-lived unit of work in the fleet runs under the registry: one
//! `CONNECTION` task per live bot connection plus one `RATE_LIMITER`
//! maintenance task per connection. The registry provides:
//! - **Idempotent start:** `add_task` refuses a second task for the same
//!   `(group, id)` while one is still registered
//! - **Cooperative stop:** `remove_task` requests cancellation and returns
//!   immediately; the entry disappears once the task has unwound
//! - **Fault isolation:** one task failing never takes down its siblings

mod core;
mod types;

pub use core::TaskRegistry;
pub use types::{TaskGroup, TaskOutcome, TaskReport};
