//! Entry point that routes triggers to the dispatcher or the sweeper.
//!
//! A trigger envelope carrying the scheduled-source marker runs a sweep.
//! Anything else is treated as an event to publish. Invocations always
//! complete; delivery and store failures are absorbed into the outcome.

use std::sync::Arc;

use relay_core::{Clock, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    client::{ClientConfig, Deliverer, DeliveryClient},
    dispatcher::{DispatchOutcome, Dispatcher},
    error::{DeliveryError, Result},
    storage::{RetryStore, SubscriberDirectory},
    sweeper::{SweepOutcome, Sweeper},
};

/// `source` value marking a timer-driven sweep trigger.
pub const SCHEDULED_SOURCE: &str = "aws.events";

/// What an invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Deliver a new event to every subscriber.
    Publish(Event),
    /// Re-attempt every pending delivery.
    Sweep,
}

impl Trigger {
    /// Classifies a raw trigger envelope.
    ///
    /// An object whose `source` field equals [`SCHEDULED_SOURCE`] is a sweep;
    /// the whole envelope is otherwise the event payload.
    pub fn from_envelope(envelope: Value) -> Self {
        let scheduled = envelope.get("source").and_then(Value::as_str) == Some(SCHEDULED_SOURCE);

        if scheduled {
            Self::Sweep
        } else {
            Self::Publish(Event::new(envelope))
        }
    }
}

/// Tunables shared by the dispatcher and sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// How long after the first failure a record keeps being retried.
    pub expiry_window: std::time::Duration,
    /// Maximum concurrent deliveries within one invocation.
    pub delivery_concurrency: usize,
    /// HTTP client configuration.
    pub client_config: ClientConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            expiry_window: std::time::Duration::from_secs(
                u64::try_from(crate::DEFAULT_EXPIRY_HOURS).unwrap_or(24) * 3600,
            ),
            delivery_concurrency: crate::DEFAULT_CONCURRENCY,
            client_config: ClientConfig::default(),
        }
    }
}

/// Result of handling one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", content = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    /// A publish trigger was dispatched.
    Publish(DispatchOutcome),
    /// A sweep trigger was processed.
    Sweep(SweepOutcome),
}

/// Dispatcher and sweeper sharing one store and deliverer.
pub struct Relay {
    dispatcher: Dispatcher,
    sweeper: Sweeper,
}

impl Relay {
    /// Builds a relay that delivers over HTTP.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built from the config.
    pub fn new(
        config: &RelayConfig,
        directory: Arc<dyn SubscriberDirectory>,
        store: Arc<dyn RetryStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = DeliveryClient::new(config.client_config.clone(), clock.clone())?;
        Self::from_parts(config, directory, store, Arc::new(client), clock)
    }

    /// Builds a relay around an existing deliverer.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the expiry window does
    /// not fit a signed time delta.
    pub fn from_parts(
        config: &RelayConfig,
        directory: Arc<dyn SubscriberDirectory>,
        store: Arc<dyn RetryStore>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let expiry_window = chrono::Duration::from_std(config.expiry_window).map_err(|e| {
            DeliveryError::configuration(format!(
                "expiry window of {}s is out of range: {e}",
                config.expiry_window.as_secs()
            ))
        })?;

        let dispatcher =
            Dispatcher::new(directory, store.clone(), deliverer.clone(), clock.clone())
                .with_concurrency(config.delivery_concurrency);
        let sweeper = Sweeper::new(store, deliverer, clock)
            .with_expiry_window(expiry_window)
            .with_concurrency(config.delivery_concurrency);

        Ok(Self { dispatcher, sweeper })
    }

    /// Handles one trigger to completion.
    pub async fn handle(&self, trigger: Trigger) -> RelayOutcome {
        match trigger {
            Trigger::Publish(event) => {
                debug!(payload = %event.payload(), "received publish trigger");
                RelayOutcome::Publish(self.dispatcher.dispatch(&event).await)
            },
            Trigger::Sweep => {
                debug!("received sweep trigger");
                RelayOutcome::Sweep(self.sweeper.sweep().await)
            },
        }
    }

    /// Classifies and handles a raw trigger envelope.
    pub async fn handle_envelope(&self, envelope: Value) -> RelayOutcome {
        self.handle(Trigger::from_envelope(envelope)).await
    }

    /// Dispatches an event to every subscriber.
    pub async fn publish(&self, event: &Event) -> DispatchOutcome {
        self.dispatcher.dispatch(event).await
    }

    /// Runs one sweep.
    pub async fn sweep(&self) -> SweepOutcome {
        self.sweeper.sweep().await
    }
}

#[cfg(test)]
mod tests {
    use relay_core::TestClock;
    use serde_json::json;

    use super::*;
    use crate::{
        client::mock::MockDeliverer,
        storage::mock::{MockRetryStore, MockSubscriberDirectory},
    };

    #[test]
    fn scheduled_source_selects_sweep() {
        let envelope = json!({"source": "aws.events", "detail-type": "Scheduled Event"});
        assert_eq!(Trigger::from_envelope(envelope), Trigger::Sweep);
    }

    #[test]
    fn anything_else_is_published_whole() {
        let envelope = json!({"source": "orders", "id": 1});
        let expected = Trigger::Publish(Event::new(envelope.clone()));
        assert_eq!(Trigger::from_envelope(envelope), expected);
        assert!(matches!(Trigger::from_envelope(json!([1, 2])), Trigger::Publish(_)));
        assert!(matches!(Trigger::from_envelope(json!({"source": 7})), Trigger::Publish(_)));
    }

    #[test]
    fn out_of_range_expiry_window_is_rejected() {
        let config = RelayConfig {
            expiry_window: std::time::Duration::from_secs(u64::MAX),
            ..RelayConfig::default()
        };

        let result = Relay::from_parts(
            &config,
            Arc::new(MockSubscriberDirectory::default()),
            Arc::new(MockRetryStore::new()),
            Arc::new(MockDeliverer::new()),
            Arc::new(TestClock::new()),
        );

        assert!(matches!(result, Err(DeliveryError::ConfigurationError { .. })));
    }

    #[test]
    fn default_config_matches_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.expiry_window, std::time::Duration::from_secs(24 * 3600));
        assert_eq!(config.delivery_concurrency, 16);
        assert_eq!(config.client_config.timeout, std::time::Duration::from_secs(30));
    }
}
