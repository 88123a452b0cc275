//! Core domain models and storage primitives.
//!
//! Provides the event and subscriber types, the pending delivery record with
//! its canonical identity, clock abstractions, and the PostgreSQL table
//! repositories backing the retry store and subscriber directory. The
//! delivery and API crates depend on these types for consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod canonical;
pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{DeliveryKey, Event, PendingDelivery, Subscriber};
pub use time::{Clock, RealClock, TestClock};
