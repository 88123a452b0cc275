//! Storage abstraction layer for the dispatcher and sweeper.
//!
//! Provides trait-based abstractions over the retry store and subscriber
//! directory so relay logic can be tested without a database. Production
//! implementations wrap the `relay_core::storage` repositories; tests use the
//! in-memory implementations in [`mock`].

use std::{future::Future, pin::Pin, sync::Arc};

use relay_core::{
    error::Result,
    models::{DeliveryKey, PendingDelivery, Subscriber},
    storage::{pending_deliveries, subscribers},
};
use tracing::error;

/// Boxed future returned by storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence of pending delivery records.
///
/// Operations may be invoked concurrently from overlapping dispatches and
/// sweeps; implementations need no coordination beyond keeping `delete`
/// idempotent.
pub trait RetryStore: Send + Sync + 'static {
    /// Persists a record for a failed delivery.
    ///
    /// If a record for the same `(event, subscriber)` pair already exists it
    /// is kept unchanged, so `created_at` always reflects the first failure.
    fn put(&self, record: PendingDelivery) -> StoreFuture<'_, ()>;

    /// Removes the record with the given key. Deleting an absent record
    /// succeeds.
    fn delete(&self, key: DeliveryKey) -> StoreFuture<'_, ()>;

    /// Returns every persisted record, exhausting any pagination.
    fn list_all(&self) -> StoreFuture<'_, Vec<PendingDelivery>>;
}

/// Read-only enumeration of subscribers.
pub trait SubscriberDirectory: Send + Sync + 'static {
    /// Returns every registered subscriber.
    fn list_all(&self) -> StoreFuture<'_, Vec<Subscriber>>;
}

/// Outcome of listing a table.
///
/// Distinguishes "nothing to do" from "store unreachable" while letting
/// callers treat both as an empty work set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    /// The listing succeeded (possibly with zero items).
    Available(Vec<T>),
    /// The store could not be read; the error has been logged.
    Unavailable,
}

impl<T> Listing<T> {
    /// Converts a store result, logging the error on failure.
    pub fn from_result(result: Result<Vec<T>>, source: &'static str) -> Self {
        match result {
            Ok(items) => Self::Available(items),
            Err(e) => {
                error!(source, error = %e, "listing failed");
                Self::Unavailable
            },
        }
    }

    /// Returns the items, or nothing if the store was unavailable.
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Available(items) => items,
            Self::Unavailable => Vec::new(),
        }
    }

    /// Whether the store could not be read.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Retry store backed by the PostgreSQL pending delivery table.
pub struct PostgresRetryStore {
    repository: Arc<pending_deliveries::Repository>,
}

impl PostgresRetryStore {
    /// Creates a new adapter over the repository.
    pub fn new(repository: Arc<pending_deliveries::Repository>) -> Self {
        Self { repository }
    }
}

impl RetryStore for PostgresRetryStore {
    fn put(&self, record: PendingDelivery) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let inserted = self.repository.insert(&record).await?;
            if !inserted {
                tracing::debug!(record_id = %record.id, "pending delivery already recorded");
            }
            Ok(())
        })
    }

    fn delete(&self, key: DeliveryKey) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.repository.delete(&key).await })
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<PendingDelivery>> {
        Box::pin(self.repository.list_all())
    }
}

/// Subscriber directory backed by the PostgreSQL subscriber table.
pub struct PostgresSubscriberDirectory {
    repository: Arc<subscribers::Repository>,
}

impl PostgresSubscriberDirectory {
    /// Creates a new adapter over the repository.
    pub fn new(repository: Arc<subscribers::Repository>) -> Self {
        Self { repository }
    }
}

impl SubscriberDirectory for PostgresSubscriberDirectory {
    fn list_all(&self) -> StoreFuture<'_, Vec<Subscriber>> {
        Box::pin(self.repository.list_all())
    }
}

pub mod mock {
    //! In-memory storage for testing relay logic without a database.
    //!
    //! Supports injecting failures per operation so tests can exercise the
    //! store-unavailable paths.

    use std::{collections::BTreeMap, sync::Arc};

    use relay_core::{
        error::CoreError,
        models::{DeliveryKey, PendingDelivery, Subscriber},
    };
    use tokio::sync::RwLock;

    use super::{RetryStore, StoreFuture, SubscriberDirectory};

    /// Operations of `MockRetryStore` that can be made to fail.
    #[derive(Debug, Clone, Copy, Default)]
    struct Failures {
        put: bool,
        delete: bool,
        list: bool,
    }

    /// In-memory retry store keyed by `DeliveryKey`.
    #[derive(Debug, Clone, Default)]
    pub struct MockRetryStore {
        records: Arc<RwLock<BTreeMap<DeliveryKey, PendingDelivery>>>,
        failures: Arc<RwLock<Failures>>,
    }

    impl MockRetryStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a record directly, bypassing the insert-or-keep rule.
        pub async fn insert(&self, record: PendingDelivery) {
            self.records.write().await.insert(record.id.clone(), record);
        }

        /// Returns all records ordered by key.
        pub async fn records(&self) -> Vec<PendingDelivery> {
            self.records.read().await.values().cloned().collect()
        }

        /// Returns the record for a key, if present.
        pub async fn get(&self, key: &DeliveryKey) -> Option<PendingDelivery> {
            self.records.read().await.get(key).cloned()
        }

        /// Returns the records pending for `subscriber`.
        pub async fn records_for(&self, subscriber: &str) -> Vec<PendingDelivery> {
            self.records
                .read()
                .await
                .values()
                .filter(|record| record.subscriber == subscriber)
                .cloned()
                .collect()
        }

        /// Makes `put` fail until reset.
        pub async fn fail_puts(&self, fail: bool) {
            self.failures.write().await.put = fail;
        }

        /// Makes `delete` fail until reset.
        pub async fn fail_deletes(&self, fail: bool) {
            self.failures.write().await.delete = fail;
        }

        /// Makes `list_all` fail until reset.
        pub async fn fail_listing(&self, fail: bool) {
            self.failures.write().await.list = fail;
        }
    }

    impl RetryStore for MockRetryStore {
        fn put(&self, record: PendingDelivery) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                if self.failures.read().await.put {
                    return Err(CoreError::Database("injected put failure".to_string()));
                }
                self.records.write().await.entry(record.id.clone()).or_insert(record);
                Ok(())
            })
        }

        fn delete(&self, key: DeliveryKey) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                if self.failures.read().await.delete {
                    return Err(CoreError::Database("injected delete failure".to_string()));
                }
                self.records.write().await.remove(&key);
                Ok(())
            })
        }

        fn list_all(&self) -> StoreFuture<'_, Vec<PendingDelivery>> {
            Box::pin(async move {
                if self.failures.read().await.list {
                    return Err(CoreError::Database("injected listing failure".to_string()));
                }
                Ok(self.records.read().await.values().cloned().collect())
            })
        }
    }

    /// In-memory subscriber directory.
    #[derive(Debug, Clone, Default)]
    pub struct MockSubscriberDirectory {
        subscribers: Arc<RwLock<Vec<Subscriber>>>,
        unavailable: Arc<RwLock<bool>>,
    }

    impl MockSubscriberDirectory {
        /// Creates a directory with the given endpoints.
        pub fn with_endpoints<I, S>(endpoints: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let subscribers = endpoints.into_iter().map(Subscriber::new).collect();
            Self { subscribers: Arc::new(RwLock::new(subscribers)), ..Self::default() }
        }

        /// Registers another endpoint.
        pub async fn add(&self, endpoint: impl Into<String>) {
            self.subscribers.write().await.push(Subscriber::new(endpoint));
        }

        /// Makes `list_all` fail until reset.
        pub async fn set_unavailable(&self, unavailable: bool) {
            *self.unavailable.write().await = unavailable;
        }
    }

    impl SubscriberDirectory for MockSubscriberDirectory {
        fn list_all(&self) -> StoreFuture<'_, Vec<Subscriber>> {
            Box::pin(async move {
                if *self.unavailable.read().await {
                    return Err(CoreError::Database("injected directory failure".to_string()));
                }
                Ok(self.subscribers.read().await.clone())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use relay_core::{error::CoreError, Event};
    use serde_json::json;

    use super::{mock::MockRetryStore, *};

    #[test]
    fn listing_distinguishes_empty_from_unavailable() {
        let empty: Listing<Subscriber> = Listing::from_result(Ok(Vec::new()), "test");
        let failed: Listing<Subscriber> =
            Listing::from_result(Err(CoreError::Database("down".into())), "test");

        assert_eq!(empty, Listing::Available(Vec::new()));
        assert!(!empty.is_unavailable());
        assert!(failed.is_unavailable());
        assert!(failed.into_items().is_empty());
    }

    #[tokio::test]
    async fn put_keeps_the_first_record() {
        let store = MockRetryStore::new();
        let event = Event::new(json!({"id": 1}));
        let first = Utc::now();
        let later = first + chrono::Duration::hours(1);

        store.put(PendingDelivery::new(event.clone(), "http://a", first)).await.unwrap();
        store.put(PendingDelivery::new(event.clone(), "http://a", later)).await.unwrap();

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].created_at, first);
    }

    #[tokio::test]
    async fn deleting_absent_record_is_a_no_op() {
        let store = MockRetryStore::new();
        let key = DeliveryKey::new(&Event::new(json!({"id": 1})), "http://a");

        store.delete(key.clone()).await.unwrap();
        store.delete(key).await.unwrap();

        assert!(store.records().await.is_empty());
    }
}
