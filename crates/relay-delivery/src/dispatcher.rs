//! Fan-out of a newly published event to every subscriber.
//!
//! Each subscriber gets exactly one attempt. A failed attempt is recorded in
//! the retry store so the sweeper can pick it up later; the dispatcher never
//! retries on its own.

use std::sync::Arc;

use futures::{stream, StreamExt};
use relay_core::{Clock, Event, PendingDelivery, Subscriber};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    client::Deliverer,
    storage::{Listing, RetryStore, SubscriberDirectory},
};

/// Counts of what happened during one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Subscribers that accepted the event.
    pub delivered: usize,
    /// Subscribers whose failure was recorded for retry.
    pub deferred: usize,
    /// Failures that could not be recorded. These deliveries are lost.
    pub persist_failures: usize,
}

impl DispatchReport {
    /// Total number of subscribers attempted.
    pub fn attempted(&self) -> usize {
        self.delivered + self.deferred + self.persist_failures
    }
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Every subscriber was attempted.
    Completed(DispatchReport),
    /// The subscriber directory could not be read; nothing was attempted
    /// and nothing was recorded.
    DirectoryUnavailable,
}

enum AttemptResult {
    Delivered,
    Deferred,
    PersistFailed,
}

/// Delivers events to all subscribers, deferring failures to the retry store.
pub struct Dispatcher {
    directory: Arc<dyn SubscriberDirectory>,
    store: Arc<dyn RetryStore>,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl Dispatcher {
    /// Creates a dispatcher with the default fan-out concurrency.
    pub fn new(
        directory: Arc<dyn SubscriberDirectory>,
        store: Arc<dyn RetryStore>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { directory, store, deliverer, clock, concurrency: crate::DEFAULT_CONCURRENCY }
    }

    /// Sets how many subscribers are attempted at once. Zero is treated as
    /// one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Delivers `event` once to every subscriber.
    ///
    /// Every subscriber is attempted regardless of earlier failures. A failed
    /// attempt is persisted as a `PendingDelivery` stamped with the current
    /// time. Failure to persist is logged and counted, never raised.
    pub async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let span = info_span!("dispatch", event = %event.canonical_json());

        async move {
            let listing = Listing::from_result(self.directory.list_all().await, "subscribers");
            let Listing::Available(subscribers) = listing else {
                warn!("subscriber directory unavailable, event dropped");
                return DispatchOutcome::DirectoryUnavailable;
            };

            debug!(subscribers = subscribers.len(), "fanning out event");

            let results: Vec<AttemptResult> = stream::iter(subscribers)
                .map(|subscriber| self.attempt(event, subscriber))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let mut report = DispatchReport::default();
            for result in results {
                match result {
                    AttemptResult::Delivered => report.delivered += 1,
                    AttemptResult::Deferred => report.deferred += 1,
                    AttemptResult::PersistFailed => report.persist_failures += 1,
                }
            }

            info!(
                delivered = report.delivered,
                deferred = report.deferred,
                persist_failures = report.persist_failures,
                "dispatch completed"
            );

            DispatchOutcome::Completed(report)
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, event: &Event, subscriber: Subscriber) -> AttemptResult {
        if self.deliverer.deliver(event, &subscriber.endpoint).await {
            return AttemptResult::Delivered;
        }

        let record = PendingDelivery::new(event.clone(), subscriber.endpoint, self.clock.now_utc());
        let record_id = record.id.clone();

        match self.store.put(record).await {
            Ok(()) => {
                debug!(record_id = %record_id, "failed delivery recorded for retry");
                AttemptResult::Deferred
            },
            Err(e) => {
                error!(record_id = %record_id, error = %e, "failed to record pending delivery");
                AttemptResult::PersistFailed
            },
        }
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

    #[tokio::test]
    async fn empty_directory_completes_with_nothing_attempted() {
        let store = MockRetryStore::new();
        let dispatcher = Dispatcher::new(
            Arc::new(MockSubscriberDirectory::default()),
            Arc::new(store.clone()),
            Arc::new(MockDeliverer::new()),
            Arc::new(TestClock::new()),
        );

        let outcome = dispatcher.dispatch(&Event::new(json!({"id": 1}))).await;

        assert_eq!(outcome, DispatchOutcome::Completed(DispatchReport::default()));
        assert!(store.records().await.is_empty());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = DispatchOutcome::Completed(DispatchReport {
            delivered: 2,
            deferred: 1,
            persist_failures: 0,
        });
        let value = serde_json::to_value(outcome).unwrap();

        assert_eq!(value["status"], "completed");
        assert_eq!(value["delivered"], 2);
        assert_eq!(
            serde_json::to_value(DispatchOutcome::DirectoryUnavailable).unwrap(),
            json!({"status": "directory_unavailable"})
        );
    }
}
