//! Shared domain types for the PingThing monitor.

pub mod config;
pub mod events;
pub mod network;
pub mod probe;
pub mod sample;
pub mod state;

mod errors;

pub use errors::{PingError, Result};
