//! HTTP request handlers for the relay API.
//!
//! - `events` - trigger and manual sweep endpoints
//! - `health` - database health check

pub mod events;
pub mod health;

pub use events::{handle_trigger, sweep};
pub use health::{health_check, HealthCheck};
