//! Repository for the subscriber table.
//!
//! The relay only reads this table; rows are managed elsewhere. Rows are
//! projected to their `endpoint` column.

use std::sync::Arc;

use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::debug;

use super::{decode_rows, scan_pages, TableName};
use crate::{
    error::{CoreError, Result},
    models::Subscriber,
};

/// Repository for subscriber database operations.
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
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (endpoint TEXT PRIMARY KEY)",
            self.table.quoted()
        );
        sqlx::query(&sql).execute(&*self.pool).await?;
        Ok(())
    }

    /// Returns every registered subscriber, scanning all pages.
    ///
    /// Rows whose endpoint cannot be read are logged and skipped, matching
    /// the pending delivery table, so one bad row never aborts a dispatch.
    ///
    /// # Errors
    ///
    /// Returns error if any page query fails.
    pub async fn list_all(&self) -> Result<Vec<Subscriber>> {
        let sql = format!(
            "SELECT endpoint FROM {} WHERE endpoint > $1 ORDER BY endpoint LIMIT $2",
            self.table.quoted()
        );
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
            |row: &PgRow| Ok(row.try_get::<String, _>("endpoint")?),
        )
        .await?;
        let subscribers = decode_rows(&rows, &self.table, decode_row);

        debug!(table = %self.table, count = subscribers.len(), "listed subscribers");
        Ok(subscribers)
    }
}

fn decode_row(row: &PgRow) -> Result<Subscriber> {
    Ok(Subscriber::new(row.try_get::<String, _>("endpoint")?))
}
