//! SQLite session table
//!
//! One row per issued `session_id`, addressed by subject. Every statement is
//! a single self-contained query, so concurrent processes need no locking:
//! save is an upsert, clear a delete by subject, sweep a bulk delete.

use super::{BackendDescriptor, Capability, SessionBackend};
use crate::clock::Clock;
use crate::codec::{self, RecordProjection};
use crate::error::BackendError;
use crate::record::{format_timestamp, SessionRecord};
use crate::scope::SessionScope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sessionkeep_core::{is_plain_identifier, retry_async_when, DatabaseSettings, RetryConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A stored row as operators see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSessionRow {
    pub session_id: String,
    pub subject_id: String,
    pub display_name: String,
    pub role: String,
    pub created_at: String,
    pub expires_at: String,
    pub last_accessed: String,
}

pub struct DatabaseBackend {
    pool: SqlitePool,
    table: String,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    descriptor: BackendDescriptor,
}

impl DatabaseBackend {
    pub const NAME: &'static str = "database";

    /// Open a pool for `settings.url`, creating the database file if needed.
    pub async fn connect(settings: &DatabaseSettings) -> Result<SqlitePool, BackendError> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| BackendError::unavailable("database.url is not configured"))?;

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Every connection to `:memory:` is a separate database
        let max_connections = if url.contains(":memory:") {
            1
        } else {
            settings.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        debug!(url = url, max_connections = max_connections, "Connected to session database");
        Ok(pool)
    }

    /// Wrap an existing pool and make sure the session table exists.
    pub async fn new(
        pool: SqlitePool,
        settings: &DatabaseSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BackendError> {
        if !is_plain_identifier(&settings.table) {
            return Err(BackendError::Database(format!(
                "invalid table name: {}",
                settings.table
            )));
        }

        let retry = RetryConfig {
            initial_delay_ms: settings.retry_delay_ms,
            ..RetryConfig::from_attempts(settings.retry_attempts)
        };

        let backend = Self {
            pool,
            table: settings.table.clone(),
            clock,
            retry,
            descriptor: BackendDescriptor::new(Self::NAME, Capability::DurableServer),
        };
        backend.ensure_schema().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                session_id TEXT PRIMARY KEY NOT NULL,
                subject_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                record_blob TEXT NOT NULL,
                last_accessed TEXT NOT NULL
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_subject ON {table} (subject_id)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        debug!(table = %self.table, "Session table ready");
        Ok(())
    }

    pub async fn health_check(pool: &SqlitePool) -> Result<(), BackendError> {
        sqlx::query("SELECT 1").fetch_one(pool).await?;
        Ok(())
    }

    /// Run one statement under the configured retry policy.
    ///
    /// Only transient faults (I/O, busy or locked database, pool timeout)
    /// are retried; anything else fails on the first attempt.
    async fn retried<T, F>(&self, operation: &str, call: F) -> Result<T, BackendError>
    where
        F: Fn(SqlitePool) -> BoxFuture<'static, Result<T, BackendError>> + Send + Sync,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        retry_async_when(
            || call(pool.clone()),
            self.retry.clone(),
            operation,
            BackendError::is_transient,
        )
        .await
    }

    /// All stored rows, most recently accessed first
    pub async fn list_rows(&self) -> Result<Vec<StoredSessionRow>, BackendError> {
        let sql = format!(
            "SELECT session_id, subject_id, display_name, role, created_at, expires_at, last_accessed \
             FROM {} ORDER BY last_accessed DESC, rowid DESC",
            self.table
        );
        let rows = self
            .retried("database.list_rows", |pool| {
                let sql = sql.clone();
                Box::pin(async move {
                    sqlx::query(&sql)
                        .fetch_all(&pool)
                        .await
                        .map_err(BackendError::from)
                })
            })
            .await?;

        rows.iter().map(Self::row_to_stored).collect()
    }

    fn row_to_stored(row: &SqliteRow) -> Result<StoredSessionRow, BackendError> {
        Ok(StoredSessionRow {
            session_id: row.try_get("session_id")?,
            subject_id: row.try_get("subject_id")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            last_accessed: row.try_get("last_accessed")?,
        })
    }

    /// Prefer the full blob; fall back to the projected columns.
    fn row_to_record(row: &SqliteRow) -> Result<Option<SessionRecord>, BackendError> {
        let blob: String = row.try_get("record_blob")?;
        if let Some(record) = codec::decode_json(&blob) {
            return Ok(Some(record));
        }

        let projection = RecordProjection {
            session_id: row.try_get("session_id")?,
            subject_id: row.try_get("subject_id")?,
            display_name: row.try_get("display_name")?,
            role: row.try_get("role")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        };
        warn!(session_id = %projection.session_id, "Rebuilding session from projected columns");
        Ok(projection.to_record())
    }
}

#[async_trait]
impl SessionBackend for DatabaseBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn save(
        &self,
        _scope: &mut SessionScope,
        record: &SessionRecord,
    ) -> Result<(), BackendError> {
        // Replaying a session_id keeps created_at and last_accessed, so replays converge
        let sql = format!(
            r#"
            INSERT INTO {}
            (session_id, subject_id, display_name, role, created_at, expires_at, record_blob, last_accessed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                expires_at = excluded.expires_at,
                record_blob = excluded.record_blob
            "#,
            self.table
        );
        let projection = RecordProjection::of(record);
        let blob = codec::encode_json(record)?;
        let accessed = format_timestamp(&self.clock.now());
        self.retried("database.save", |pool| {
            let sql = sql.clone();
            let projection = projection.clone();
            let blob = blob.clone();
            let accessed = accessed.clone();
            Box::pin(async move {
                sqlx::query(&sql)
                    .bind(projection.session_id)
                    .bind(projection.subject_id)
                    .bind(projection.display_name)
                    .bind(projection.role)
                    .bind(projection.created_at)
                    .bind(projection.expires_at)
                    .bind(blob)
                    .bind(accessed)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(BackendError::from)
            })
        })
        .await?;

        debug!(session_id = %record.session_id, "Session upserted");
        Ok(())
    }

    async fn load(&self, scope: &SessionScope) -> Result<Option<SessionRecord>, BackendError> {
        let Some(subject) = scope.subject_hint() else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT session_id, subject_id, display_name, role, created_at, expires_at, record_blob \
             FROM {} WHERE subject_id = ? AND expires_at > ? \
             ORDER BY last_accessed DESC, rowid DESC LIMIT 1",
            self.table
        );
        let subject = subject.to_string();
        let now = format_timestamp(&self.clock.now());
        let row = self
            .retried("database.load", |pool| {
                let sql = sql.clone();
                let subject = subject.clone();
                let now = now.clone();
                Box::pin(async move {
                    sqlx::query(&sql)
                        .bind(subject)
                        .bind(now)
                        .fetch_optional(&pool)
                        .await
                        .map_err(BackendError::from)
                })
            })
            .await?;

        match row {
            Some(row) => Self::row_to_record(&row),
            None => Ok(None),
        }
    }

    async fn clear(
        &self,
        _scope: &mut SessionScope,
        subject_hint: &str,
    ) -> Result<(), BackendError> {
        if subject_hint.is_empty() {
            return Err(BackendError::MissingSubject);
        }

        let sql = format!("DELETE FROM {} WHERE subject_id = ?", self.table);
        let subject = subject_hint.to_string();
        let deleted = self
            .retried("database.clear", |pool| {
                let sql = sql.clone();
                let subject = subject.clone();
                Box::pin(async move {
                    sqlx::query(&sql)
                        .bind(subject)
                        .execute(&pool)
                        .await
                        .map(|result| result.rows_affected())
                        .map_err(BackendError::from)
                })
            })
            .await?;

        debug!(subject = subject_hint, deleted = deleted, "Cleared stored sessions");
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, BackendError> {
        let sql = format!("DELETE FROM {} WHERE expires_at <= ?", self.table);
        let cutoff = format_timestamp(&now);
        let deleted = self
            .retried("database.sweep", |pool| {
                let sql = sql.clone();
                let cutoff = cutoff.clone();
                Box::pin(async move {
                    sqlx::query(&sql)
                        .bind(cutoff)
                        .execute(&pool)
                        .await
                        .map(|result| result.rows_affected())
                        .map_err(BackendError::from)
                })
            })
            .await?;

        info!(table = %self.table, deleted = deleted, "Swept expired sessions");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::SessionPolicy;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> DatabaseSettings {
        DatabaseSettings {
            url: Some("sqlite::memory:".to_string()),
            retry_attempts: 1,
            ..DatabaseSettings::default()
        }
    }

    async fn backend(clock: &ManualClock) -> DatabaseBackend {
        backend_with(clock, settings()).await
    }

    async fn backend_with(clock: &ManualClock, settings: DatabaseSettings) -> DatabaseBackend {
        let pool = DatabaseBackend::connect(&settings).await.unwrap();
        DatabaseBackend::new(pool, &settings, Arc::new(clock.clone()))
            .await
            .unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_load_by_subject_hint() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let record = SessionPolicy::default().issue("alice", "Alice A", "Admin", t0()).unwrap();

        let mut scope = SessionScope::new();
        backend.save(&mut scope, &record).await.unwrap();

        assert!(backend.load(&scope).await.unwrap().is_none());

        scope.seed_subject("alice");
        assert_eq!(backend.load(&scope).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_replayed_save_converges() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let record = SessionPolicy::default().issue("alice", "Alice A", "Admin", t0()).unwrap();
        let mut scope = SessionScope::new();

        backend.save(&mut scope, &record).await.unwrap();
        let before = backend.list_rows().await.unwrap();

        clock.advance(Duration::minutes(5));
        backend.save(&mut scope, &record).await.unwrap();
        let after = backend.list_rows().await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_row_is_not_loaded() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let record = SessionPolicy::default().issue("alice", "Alice A", "Admin", t0()).unwrap();
        let mut scope = SessionScope::new();
        backend.save(&mut scope, &record).await.unwrap();

        scope.seed_subject("alice");
        clock.set(record.expires_at);
        assert!(backend.load(&scope).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_falls_back_to_columns() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let record = SessionPolicy::default().issue("alice", "Alice A", "Admin", t0()).unwrap();
        let mut scope = SessionScope::new();
        backend.save(&mut scope, &record).await.unwrap();

        sqlx::query(&format!("UPDATE {} SET record_blob = '{{'", backend.table()))
            .execute(backend.pool())
            .await
            .unwrap();

        scope.seed_subject("alice");
        assert_eq!(backend.load(&scope).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_clear_requires_subject() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let mut scope = SessionScope::new();

        assert_eq!(
            backend.clear(&mut scope, "").await,
            Err(BackendError::MissingSubject)
        );
        backend.clear(&mut scope, "nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check() {
        let pool = DatabaseBackend::connect(&settings()).await.unwrap();
        DatabaseBackend::health_check(&pool).await.unwrap();

        let missing = DatabaseSettings::default();
        assert!(matches!(
            DatabaseBackend::connect(&missing).await,
            Err(BackendError::Unavailable(_))
        ));
    }

    fn retrying_settings(retry_delay_ms: u64) -> DatabaseSettings {
        DatabaseSettings {
            retry_attempts: 3,
            retry_delay_ms,
            ..settings()
        }
    }

    #[tokio::test]
    async fn test_transient_fault_is_retried() {
        let clock = ManualClock::new(t0());
        let backend = backend_with(&clock, retrying_settings(1)).await;
        let calls = AtomicUsize::new(0);

        let value: Result<usize, BackendError> = backend
            .retried("database.load", |_pool| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    if attempt < 3 {
                        Err(BackendError::Busy("database is locked".into()))
                    } else {
                        Ok(attempt)
                    }
                })
            })
            .await;

        assert_eq!(value, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_fault_is_not_retried() {
        let clock = ManualClock::new(t0());
        let backend = backend_with(&clock, retrying_settings(1)).await;
        let calls = AtomicUsize::new(0);

        let value: Result<(), BackendError> = backend
            .retried("database.save", |_pool| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err::<(), _>(BackendError::Database("no such table".into())) })
            })
            .await;

        assert!(matches!(value, Err(BackendError::Database(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_table_fails_without_backoff() {
        let clock = ManualClock::new(t0());
        // A retried statement would sleep 10s before its second attempt
        let backend = backend_with(&clock, retrying_settings(10_000)).await;
        sqlx::query(&format!("DROP TABLE {}", backend.table()))
            .execute(backend.pool())
            .await
            .unwrap();

        let record = SessionPolicy::default()
            .issue("alice", "Alice A", "Admin", t0())
            .unwrap();
        let mut scope = SessionScope::new();
        let saved = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            backend.save(&mut scope, &record),
        )
        .await
        .expect("permanent fault should not be retried");

        let err = saved.unwrap_err();
        assert!(matches!(err, BackendError::Database(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_rows() {
        let clock = ManualClock::new(t0());
        let backend = backend(&clock).await;
        let policy = SessionPolicy::default();
        let mut scope = SessionScope::new();
        for (subject, issued) in [("alice", t0() - Duration::days(8)), ("bob", t0())] {
            let record = policy.issue(subject, subject, "Admin", issued).unwrap();
            backend.save(&mut scope, &record).await.unwrap();
        }

        assert_eq!(backend.sweep_expired(t0()).await.unwrap(), 1);
        let rows = backend.list_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject_id, "bob");
    }
}
