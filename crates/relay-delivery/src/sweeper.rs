//! Periodic retry of pending deliveries.
//!
//! A sweep lists every pending record and re-attempts each one. Delivered
//! records are deleted. A failed record is deleted only once its expiry
//! window has elapsed since the first failure; otherwise it stays for the
//! next sweep.

use std::sync::Arc;

use futures::{stream, StreamExt};
use relay_core::{time::format_timestamp, Clock, PendingDelivery};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    client::Deliverer,
    storage::{Listing, RetryStore},
};

/// Counts of what happened to each record during one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records delivered and deleted.
    pub delivered: usize,
    /// Records dropped after exceeding the expiry window.
    pub expired: usize,
    /// Records that failed again and stay pending.
    pub retained: usize,
    /// Records whose deletion failed. They are retried next sweep.
    pub delete_failures: usize,
}

impl SweepReport {
    /// Total number of records processed.
    pub fn processed(&self) -> usize {
        self.delivered + self.expired + self.retained + self.delete_failures
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// Every listed record was processed.
    Completed(SweepReport),
    /// The retry store could not be listed; no record was touched.
    StoreUnavailable,
}

enum RecordResult {
    Delivered,
    Expired,
    Retained,
    DeleteFailed,
}

/// Re-attempts pending deliveries and enforces the expiry window.
pub struct Sweeper {
    store: Arc<dyn RetryStore>,
    deliverer: Arc<dyn Deliverer>,
    clock: Arc<dyn Clock>,
    expiry_window: chrono::Duration,
    concurrency: usize,
}

impl Sweeper {
    /// Creates a sweeper with the default expiry window and concurrency.
    pub fn new(
        store: Arc<dyn RetryStore>,
        deliverer: Arc<dyn Deliverer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            deliverer,
            clock,
            expiry_window: chrono::Duration::hours(crate::DEFAULT_EXPIRY_HOURS),
            concurrency: crate::DEFAULT_CONCURRENCY,
        }
    }

    /// Sets how long after the first failure a record keeps being retried.
    #[must_use]
    pub fn with_expiry_window(mut self, expiry_window: chrono::Duration) -> Self {
        self.expiry_window = expiry_window;
        self
    }

    /// Sets how many records are attempted at once. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns the configured expiry window.
    pub fn expiry_window(&self) -> chrono::Duration {
        self.expiry_window
    }

    /// Runs one pass over the whole backlog.
    ///
    /// Each record is attempted exactly once. Record failures never abort
    /// the sweep; a listing failure aborts it before anything is touched.
    pub async fn sweep(&self) -> SweepOutcome {
        async move {
            let listing = Listing::from_result(self.store.list_all().await, "pending_deliveries");
            let Listing::Available(records) = listing else {
                warn!("retry store unavailable, sweep skipped");
                return SweepOutcome::StoreUnavailable;
            };

            debug!(backlog = records.len(), "sweeping pending deliveries");

            let results: Vec<RecordResult> = stream::iter(records)
                .map(|record| self.process(record))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let mut report = SweepReport::default();
            for result in results {
                match result {
                    RecordResult::Delivered => report.delivered += 1,
                    RecordResult::Expired => report.expired += 1,
                    RecordResult::Retained => report.retained += 1,
                    RecordResult::DeleteFailed => report.delete_failures += 1,
                }
            }

            info!(
                delivered = report.delivered,
                expired = report.expired,
                retained = report.retained,
                delete_failures = report.delete_failures,
                "sweep completed"
            );

            SweepOutcome::Completed(report)
        }
        .instrument(info_span!("sweep"))
        .await
    }

    async fn process(&self, record: PendingDelivery) -> RecordResult {
        let delivered = self.deliverer.deliver(&record.event, &record.subscriber).await;

        if delivered {
            return match self.store.delete(record.id.clone()).await {
                Ok(()) => {
                    info!(
                        record_id = %record.id,
                        subscriber = %record.subscriber,
                        "retry delivered"
                    );
                    RecordResult::Delivered
                },
                Err(e) => {
                    error!(record_id = %record.id, error = %e, "failed to delete delivered record");
                    RecordResult::DeleteFailed
                },
            };
        }

        let now = self.clock.now_utc();
        if !record.is_expired(now, self.expiry_window) {
            let expires_at = record.expires_at(self.expiry_window);
            debug!(
                record_id = %record.id,
                expires_at = ?expires_at.as_ref().map(format_timestamp),
                "retry failed, record retained"
            );
            return RecordResult::Retained;
        }

        match self.store.delete(record.id.clone()).await {
            Ok(()) => {
                info!(
                    record_id = %record.id,
                    subscriber = %record.subscriber,
                    created_at = %format_timestamp(&record.created_at),
                    "pending delivery expired"
                );
                RecordResult::Expired
            },
            Err(e) => {
                error!(record_id = %record.id, error = %e, "failed to delete expired record");
                RecordResult::DeleteFailed
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use relay_core::{Event, TestClock};
    use serde_json::json;

    use super::*;
    use crate::{client::mock::MockDeliverer, storage::mock::MockRetryStore};

    fn sweeper(store: &MockRetryStore, deliverer: &MockDeliverer, clock: &TestClock) -> Sweeper {
        Sweeper::new(Arc::new(store.clone()), Arc::new(deliverer.clone()), Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn empty_backlog_completes() {
        let store = MockRetryStore::new();
        let outcome = sweeper(&store, &MockDeliverer::new(), &TestClock::new()).sweep().await;

        assert_eq!(outcome, SweepOutcome::Completed(SweepReport::default()));
    }

    #[tokio::test]
    async fn failed_delete_after_success_is_counted() {
        let clock = TestClock::at(Utc::now());
        let store = MockRetryStore::new();
        let deliverer = MockDeliverer::new();
        deliverer.succeed("http://ok").await;
        let event = Event::new(json!({"id": 1}));
        store.insert(PendingDelivery::new(event, "http://ok", clock.now_utc())).await;
        store.fail_deletes(true).await;

        let outcome = sweeper(&store, &deliverer, &clock).sweep().await;

        let SweepOutcome::Completed(report) = outcome else {
            panic!("expected completed sweep, got {outcome:?}");
        };
        assert_eq!(report.delete_failures, 1);
        assert_eq!(store.records().await.len(), 1);
    }

    #[test]
    fn default_window_is_one_day() {
        let sweeper = Sweeper::new(
            Arc::new(MockRetryStore::new()),
            Arc::new(MockDeliverer::new()),
            Arc::new(TestClock::new()),
        );
        assert_eq!(sweeper.expiry_window(), chrono::Duration::hours(24));
    }
}
