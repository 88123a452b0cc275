//! Repository for pending delivery records.
//!
//! Rows hold the canonical event payload, the subscriber endpoint and the
//! textual `created_at` of the first failed attempt. Records are only ever
//! inserted and deleted; an existing record is never overwritten, so the
//! expiry clock keeps running from the first failure.

use std::sync::Arc;

use sqlx::{postgres::PgRow, types::Json, PgPool, Row};
use tracing::debug;

use super::{decode_rows, scan_pages, TableName};
use crate::{
    error::{CoreError, Result},
    models::{DeliveryKey, Event, PendingDelivery},
    time::{format_timestamp, parse_timestamp},
};

/// Repository for pending delivery database operations.
pub struct Repository {
    pool: Arc<PgPool>,
    table: TableName,
    page_size: i64,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>, table: TableName, page_size: i64) -> Self {
        Self { pool, table, page_size: page_size.max(1) }
    }

    /// Creates the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL statement fails.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(&create_table_sql(&self.table)).execute(&*self.pool).await?;
        Ok(())
    }

    /// Inserts a record unless one already exists for the same key.
    ///
    /// Returns `true` if a row was written, `false` if a record for the
    /// `(event, subscriber)` pair was already pending.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert(&self, record: &PendingDelivery) -> Result<bool> {
        let result = sqlx::query(&insert_sql(&self.table))
            .bind(record.id.as_str())
            .bind(Json(record.event.canonical_payload()))
            .bind(&record.subscriber)
            .bind(format_timestamp(&record.created_at))
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the record with the given key. Absent records are not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, key: &DeliveryKey) -> Result<()> {
        let result = sqlx::query(&delete_sql(&self.table))
            .bind(key.as_str())
            .execute(&*self.pool)
            .await?;

        debug!(record_id = %key, rows = result.rows_affected(), "pending delivery delete");
        Ok(())
    }

    /// Returns every persisted record.
    ///
    /// Scans the table in key order one page at a time until a short page is
    /// returned. Rows that cannot be decoded are logged and skipped so that
    /// one corrupt row does not hide the rest of the backlog.
    ///
    /// # Errors
    ///
    /// Returns error if any page query fails; no partial result is returned.
    pub async fn list_all(&self) -> Result<Vec<PendingDelivery>> {
        let sql = page_sql(&self.table);
        let (sql, pool, page_size) = (sql.as_str(), &*self.pool, self.page_size);

        let rows = scan_pages(
            page_size,
            move |cursor| async move {
                sqlx::query(sql)
                    .bind(cursor)
                    .bind(page_size)
                    .fetch_all(pool)
                    .await
                    .map_err(CoreError::from)
            },
            |row: &PgRow| Ok(row.try_get("id")?),
        )
        .await?;
        let records = decode_rows(&rows, &self.table, decode_row);

        debug!(table = %self.table, count = records.len(), "listed pending deliveries");
        Ok(records)
    }
}

fn decode_row(row: &PgRow) -> Result<PendingDelivery> {
    let id: String = row.try_get("id")?;
    let Json(payload): Json<serde_json::Value> = row.try_get("event")?;
    let subscriber: String = row.try_get("subscriber")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(PendingDelivery {
        id: DeliveryKey::from_stored(id),
        event: Event::new(payload),
        subscriber,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn create_table_sql(table: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id TEXT PRIMARY KEY,
            event JSONB NOT NULL,
            subscriber TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        table.quoted()
    )
}

fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (id, event, subscriber, created_at) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO NOTHING",
        table.quoted()
    )
}

fn delete_sql(table: &TableName) -> String {
    format!("DELETE FROM {} WHERE id = $1", table.quoted())
}

fn page_sql(table: &TableName) -> String {
    format!(
        "SELECT id, event, subscriber, created_at FROM {} WHERE id > $1 ORDER BY id LIMIT $2",
        table.quoted()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableName {
        TableName::new("events").unwrap()
    }

    #[test]
    fn insert_keeps_existing_rows() {
        let sql = insert_sql(&table());
        assert!(sql.starts_with("INSERT INTO \"events\""));
        assert!(sql.contains("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn scan_is_keyset_paginated() {
        let sql = page_sql(&table());
        assert!(sql.contains("WHERE id > $1"));
        assert!(sql.contains("ORDER BY id LIMIT $2"));
    }

    #[test]
    fn delete_is_keyed_by_id() {
        assert_eq!(delete_sql(&table()), "DELETE FROM \"events\" WHERE id = $1");
    }

    #[test]
    fn schema_uses_text_timestamps() {
        let sql = create_table_sql(&table());
        assert!(sql.contains("created_at TEXT NOT NULL"));
        assert!(sql.contains("id TEXT PRIMARY KEY"));
    }
}
