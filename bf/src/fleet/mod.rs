//! Fleet orchestration
//!
//! The composition root and everything that runs under it: [`Fleet`] brings
//! the fleet up and tears it down, [`FleetHandle`] is the start/stop surface
//! shared with the dialogue handlers, [`Connection`] is one bot's message
//! loop, and [`handlers`] holds the static dispatch tables.

mod connection;
mod core;
mod handle;
pub mod handlers;

pub use connection::Connection;
pub use core::Fleet;
pub use handle::{FleetHandle, TransportFactory};
pub use handlers::{Dispatch, HandlerCtx};
