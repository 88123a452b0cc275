//! Fan-out and retry engine for the event relay.
//!
//! This crate implements the delivery-and-retry logic: a new event is
//! delivered once to every subscriber, failures are recorded in a retry
//! store, and a periodic sweep re-attempts recorded failures until they
//! succeed or exceed the expiry window.
//!
//! # Architecture
//!
//! Two entry points share one HTTP client and one retry store:
//!
//! 1. **Dispatcher** - Lists subscribers and attempts each once, recording
//!    failures as pending deliveries
//! 2. **Sweeper** - Lists pending deliveries and re-attempts each, deleting
//!    delivered and expired records
//!
//! `Relay` routes a trigger envelope to one of them and `SweepScheduler`
//! issues sweep triggers on a timer. Storage and HTTP sit behind the
//! `RetryStore`, `SubscriberDirectory` and `Deliverer` traits so every
//! component can run against the in-memory doubles in the `mock` modules.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use relay_core::{storage::Storage, RealClock};
//! use relay_delivery::{
//!     storage::{PostgresRetryStore, PostgresSubscriberDirectory},
//!     Relay, RelayConfig, Trigger,
//! };
//!
//! # async fn example(storage: Storage) -> relay_delivery::Result<()> {
//! let relay = Relay::new(
//!     &RelayConfig::default(),
//!     Arc::new(PostgresSubscriberDirectory::new(storage.subscribers.clone())),
//!     Arc::new(PostgresRetryStore::new(storage.pending_deliveries.clone())),
//!     Arc::new(RealClock::new()),
//! )?;
//!
//! relay.handle(Trigger::Sweep).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod relay;
pub mod scheduler;
pub mod storage;
pub mod sweeper;

pub use client::{ClientConfig, Deliverer, DeliveryClient};
pub use dispatcher::{DispatchOutcome, DispatchReport, Dispatcher};
pub use error::{DeliveryError, Result};
pub use relay::{Relay, RelayConfig, RelayOutcome, Trigger, SCHEDULED_SOURCE};
pub use scheduler::SweepScheduler;
pub use storage::{Listing, RetryStore, SubscriberDirectory};
pub use sweeper::{SweepOutcome, SweepReport, Sweeper};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Default number of deliveries attempted concurrently within one
/// invocation.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default hours after the first failure before a pending delivery expires.
pub const DEFAULT_EXPIRY_HOURS: i64 = 24;
