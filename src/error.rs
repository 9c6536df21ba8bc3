use std::time::Duration;

use thiserror::Error;

use crate::db::config::DbConfigError;
use crate::db::migrate::MigrationError;

/// Failure modes of the progression engine.
///
/// Storage failures are never folded into empty results; callers that want a
/// best-effort display decide their own fallback (see [`EngineError::is_not_found`]).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Conflicts and busy/locked storage errors may succeed on a fresh unit-of-work.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Storage(sqlx::Error::PoolTimedOut) => true,
            Self::Storage(sqlx::Error::Database(db)) => {
                let message = db.message();
                message.contains("database is locked") || message.contains("database is busy")
            }
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

pub(crate) const MAX_WRITE_ATTEMPTS: u32 = 3;

const RETRY_BACKOFF_MS: u64 = 25;

/// Re-runs `op` while it fails with a retryable error, up to [`MAX_WRITE_ATTEMPTS`],
/// sleeping a little longer before each new attempt.
pub(crate) async fn with_retry<T, F, Fut>(operation: &'static str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = EngineResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::warn!(operation, attempt, error = %err, "retrying unit of work");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                    .await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(operation, attempt, error = %err, "unit of work failed");
                return Err(err);
            }
            ok => return ok,
        }
    }
}
