//! PostgreSQL access layer for the relay's two tables.
//!
//! Both tables are treated as plain key-value tables: the pending delivery
//! table is keyed by `DeliveryKey`, the subscriber table by endpoint. Table
//! names come from configuration, so every name is validated as an SQL
//! identifier before it is interpolated into a statement.

use std::{fmt, future::Future, sync::Arc};

use sqlx::PgPool;
use tracing::error;

pub mod pending_deliveries;
pub mod subscribers;

use crate::error::{CoreError, Result};

/// Default number of rows fetched per page when scanning a table.
pub const DEFAULT_SCAN_PAGE_SIZE: i64 = 100;

/// Validated SQL identifier used as a table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// Validates a table name.
    ///
    /// Accepts ASCII letters, digits and underscores, not starting with a
    /// digit, at most 63 bytes (the PostgreSQL identifier limit).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for anything else.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > 63 {
            return Err(CoreError::InvalidInput(format!("invalid table name: {name:?}")));
        }

        Ok(Self(name))
    }

    /// Returns the name quoted for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Walks a keyset-paginated table from the start.
///
/// `fetch` receives the key of the last row of the previous page (empty for
/// the first page) and returns the next page in key order. The walk stops at
/// the first page shorter than `page_size`, so every row is returned exactly
/// once within a single call.
///
/// # Errors
///
/// Returns the first fetch or cursor error; no partial result is returned.
pub(crate) async fn scan_pages<R, F, Fut>(
    page_size: i64,
    mut fetch: F,
    cursor_of: impl Fn(&R) -> Result<String>,
) -> Result<Vec<R>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<R>>>,
{
    let mut rows = Vec::new();
    let mut cursor = String::new();

    loop {
        let page = fetch(cursor).await?;
        let full_page = i64::try_from(page.len()).unwrap_or(i64::MAX) >= page_size;
        let next = match page.last() {
            Some(last) if full_page => Some(cursor_of(last)?),
            _ => None,
        };
        rows.extend(page);

        match next {
            Some(next) => cursor = next,
            None => return Ok(rows),
        }
    }
}

/// Decodes scanned rows, logging and skipping any that fail.
///
/// One corrupt row must not hide the rest of a table from the relay.
pub(crate) fn decode_rows<R, T>(
    rows: &[R],
    table: &TableName,
    decode: impl Fn(&R) -> Result<T>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(item) => Some(item),
            Err(e) => {
                error!(table = %table, error = %e, "skipping undecodable row");
                None
            },
        })
        .collect()
}

/// Container for the relay's repositories sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for pending delivery records.
    pub pending_deliveries: Arc<pending_deliveries::Repository>,

    /// Repository for the read-only subscriber table.
    pub subscribers: Arc<subscribers::Repository>,

    pool: Arc<PgPool>,
}

impl Storage {
    /// Creates a storage instance over the given pool and tables.
    pub fn new(
        pool: PgPool,
        event_table: TableName,
        subs_table: TableName,
        scan_page_size: i64,
    ) -> Self {
        let pool = Arc::new(pool);

        Self {
            pending_deliveries: Arc::new(pending_deliveries::Repository::new(
                pool.clone(),
                event_table,
                scan_page_size,
            )),
            subscribers: Arc::new(subscribers::Repository::new(
                pool.clone(),
                subs_table,
                scan_page_size,
            )),
            pool,
        }
    }

    /// Creates both tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns error if either statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pending_deliveries.ensure_table().await?;
        self.subscribers.ensure_table().await?;
        Ok(())
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot execute a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn keys(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("key-{i:04}")).collect()
    }

    async fn scan(table: &[String], page_size: i64, fetches: &AtomicUsize) -> Result<Vec<String>> {
        scan_pages(
            page_size,
            |cursor| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let limit = usize::try_from(page_size).unwrap();
                let page: Vec<String> =
                    table.iter().filter(|key| **key > cursor).take(limit).cloned().collect();
                async move { Ok::<_, CoreError>(page) }
            },
            |key: &String| Ok(key.clone()),
        )
        .await
    }

    #[tokio::test]
    async fn scan_returns_every_row_across_pages() {
        let table = keys(250);
        let fetches = AtomicUsize::new(0);

        let rows = scan(&table, 100, &fetches).await.unwrap();

        assert_eq!(rows, table);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn scan_of_exact_multiple_stops_on_empty_page() {
        let table = keys(200);
        let fetches = AtomicUsize::new(0);

        let rows = scan(&table, 100, &fetches).await.unwrap();

        assert_eq!(rows, table);
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn scan_of_empty_table_fetches_once() {
        let fetches = AtomicUsize::new(0);

        assert!(scan(&[], 100, &fetches).await.unwrap().is_empty());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_page_fails_the_whole_scan() {
        let mut page = 0;
        let result: Result<Vec<u32>> = scan_pages(
            2,
            |_cursor| {
                page += 1;
                let current = page;
                async move {
                    if current == 1 {
                        Ok(vec![1, 2])
                    } else {
                        Err(CoreError::Database("connection reset".to_string()))
                    }
                }
            },
            |row: &u32| Ok(row.to_string()),
        )
        .await;

        assert!(matches!(result, Err(CoreError::Database(_))));
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let table = TableName::new("subscribers").unwrap();
        let rows = ["http://a", "", "http://b"];

        let decoded = decode_rows(rows.as_slice(), &table, |row| {
            if row.is_empty() {
                return Err(CoreError::Serialization("empty endpoint".to_string()));
            }
            Ok(row.to_string())
        });

        assert_eq!(decoded, vec!["http://a", "http://b"]);
    }

    #[test]
    fn plain_identifiers_are_accepted() {
        assert_eq!(TableName::new("events").unwrap().as_str(), "events");
        let table = TableName::new("_relay_subscribers_v2").unwrap();
        assert_eq!(table.quoted(), "\"_relay_subscribers_v2\"");
    }

    #[test]
    fn injection_attempts_are_rejected() {
        for name in ["", "1events", "events; DROP TABLE x", "ev\"ents", "events-table", "évents"] {
            assert!(TableName::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn overlong_identifiers_are_rejected() {
        assert!(TableName::new("a".repeat(63)).is_ok());
        assert!(TableName::new("a".repeat(64)).is_err());
    }
}
