use crate::errors::StoreError;
use crate::models::{HourlyCount, NewVisit, VisitRecord, VisitorTotal};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::{future::Future, path::Path, time::Duration};
use tokio::fs;

const SCHEMA_SQL: &str = include_str!("schema.sql");

type VisitRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

/// SQLite store holding the singleton visitor total and the visit log.
///
/// Timestamps are stored as unix milliseconds. Every operation is bounded by
/// the timeout passed to [`Store::open`].
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
    timeout: Duration,
}

impl Store {
    pub async fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // Lock waits must outlast `timeout` so the bound surfaces as `Timeout`.
            .busy_timeout(timeout * 2);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool, timeout };
        store.init_schema().await?;
        Ok(store)
    }

    /// Creates both tables and the total row if they are missing.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|statement| !statement.is_empty())
        {
            self.bounded("init_schema", sqlx::query(statement).execute(&self.pool))
                .await?;
        }
        Ok(())
    }

    pub async fn visitor_total(&self) -> Result<VisitorTotal, StoreError> {
        let row: Option<(i64, i64)> = self
            .bounded(
                "visitor_total",
                sqlx::query_as::<_, (i64, i64)>("SELECT total_count, last_updated FROM visitors WHERE id = 1")
                    .fetch_optional(&self.pool),
            )
            .await?;

        let (total_count, last_updated) = row.ok_or(StoreError::MissingTotal)?;
        Ok(VisitorTotal {
            total_count: total_count.max(0) as u64,
            last_updated: from_millis(last_updated),
        })
    }

    pub async fn append_visit(
        &self,
        visit: &NewVisit,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let result = self
            .bounded(
                "append_visit",
                sqlx::query(
                    "INSERT INTO visitor_logs (ip_address, user_agent, page_url, referrer, visited_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(visit.client_key.as_deref())
                .bind(visit.user_agent.as_deref())
                .bind(visit.page_url.as_str())
                .bind(visit.referrer.as_str())
                .bind(at.timestamp_millis())
                .execute(&self.pool),
            )
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Adds one to the total in place, so concurrent increments never lose
    /// an update.
    pub async fn increment_total(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = self
            .bounded(
                "increment_total",
                sqlx::query(
                    "UPDATE visitors SET total_count = total_count + 1, last_updated = ? WHERE id = 1",
                )
                .bind(at.timestamp_millis())
                .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingTotal);
        }
        Ok(())
    }

    /// Most recent visits first.
    pub async fn recent_visits(&self, limit: u32) -> Result<Vec<VisitRecord>, StoreError> {
        let rows: Vec<VisitRow> = self
            .bounded(
                "recent_visits",
                sqlx::query_as::<_, VisitRow>(
                    "SELECT id, ip_address, user_agent, page_url, referrer, visited_at \
                     FROM visitor_logs ORDER BY visited_at DESC, id DESC LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, ip_address, user_agent, page_url, referrer, visited_at)| VisitRecord {
                    id,
                    ip_address,
                    user_agent,
                    page_url,
                    referrer,
                    visited_at: from_millis(visited_at),
                },
            )
            .collect())
    }

    /// Visits logged strictly after `since`, grouped by UTC hour of day.
    /// Hours without visits are omitted.
    pub async fn visits_by_hour(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<HourlyCount>, StoreError> {
        let rows: Vec<(i64, i64)> = self
            .bounded(
                "visits_by_hour",
                sqlx::query_as::<_, (i64, i64)>(
                    "SELECT CAST(strftime('%H', visited_at / 1000, 'unixepoch') AS INTEGER) AS hour, \
                     COUNT(*) AS count \
                     FROM visitor_logs WHERE visited_at > ? \
                     GROUP BY hour ORDER BY hour",
                )
                .bind(since.timestamp_millis())
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(hour, count)| HourlyCount {
                hour: hour.clamp(0, 23) as u32,
                count: count.max(0) as u64,
            })
            .collect())
    }

    /// Distinct client keys among visits logged strictly after `since`.
    pub async fn unique_visitors(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let count: i64 = self
            .bounded(
                "unique_visitors",
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(DISTINCT ip_address) FROM visitor_logs WHERE visited_at > ?",
                )
                .bind(since.timestamp_millis())
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(count.max(0) as u64)
    }

    #[cfg(test)]
    pub(crate) async fn visit_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .bounded(
                "visit_count",
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM visitor_logs").fetch_one(&self.pool),
            )
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
