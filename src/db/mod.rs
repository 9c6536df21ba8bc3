pub mod config;
pub mod migrate;
pub mod operations;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::config::DbConfig;
use crate::error::EngineResult;

/// One unit-of-work against the store. Dropping it without `commit` rolls back.
pub type UnitOfWork<'c> = Transaction<'c, Sqlite>;

/// Shared handle to the progression store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database described by `config` and applies
    /// pending migrations.
    pub async fn connect(config: &DbConfig) -> EngineResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(config.journal_mode.to_sqlx())
            .busy_timeout(config.busy_timeout)
            .foreign_keys(config.foreign_keys);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        migrate::run_migrations(&db.pool).await?;

        tracing::info!(path = %config.path.display(), "progression store ready");
        Ok(db)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read-only unit-of-work.
    pub async fn begin(&self) -> EngineResult<UnitOfWork<'static>> {
        Ok(self.pool.begin().await?)
    }

    /// Unit-of-work that holds the write lock from its first statement, the way
    /// `BEGIN IMMEDIATE` does. Competing writers wait out the busy timeout instead of
    /// failing when a deferred read transaction tries to upgrade.
    pub async fn begin_write(&self) -> EngineResult<UnitOfWork<'static>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r#"UPDATE "_migrations" SET "name" = "name" WHERE 0"#)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn from_millis(value: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value)
        .single()
        .unwrap_or_default()
}
