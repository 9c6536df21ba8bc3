use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub journal_mode: SqliteJournalMode,
    pub foreign_keys: bool,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let raw_path = std::env::var("PROGRESSION_DB_PATH")
            .unwrap_or_else(|_| "./data/progression.db".to_string());
        if raw_path.trim().is_empty() {
            return Err(DbConfigError::Invalid {
                key: "PROGRESSION_DB_PATH",
                value: raw_path,
            });
        }

        let max_connections = env_u64("PROGRESSION_DB_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(DbConfigError::Invalid {
                key: "PROGRESSION_DB_MAX_CONNECTIONS",
                value: "0".to_string(),
            });
        }

        let journal_mode = match std::env::var("PROGRESSION_DB_JOURNAL_MODE") {
            Ok(raw) => SqliteJournalMode::parse(&raw).ok_or(DbConfigError::Invalid {
                key: "PROGRESSION_DB_JOURNAL_MODE",
                value: raw,
            })?,
            Err(_) => SqliteJournalMode::Wal,
        };

        Ok(Self {
            path: PathBuf::from(raw_path),
            max_connections: max_connections as u32,
            busy_timeout: Duration::from_millis(env_u64("PROGRESSION_DB_BUSY_TIMEOUT_MS", 5000)?),
            journal_mode,
            foreign_keys: true,
        })
    }

    /// Config for a database file at `path` with default tuning.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            journal_mode: SqliteJournalMode::Wal,
            foreign_keys: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteJournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl SqliteJournalMode {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "wal" => Some(Self::Wal),
            "delete" => Some(Self::Delete),
            "truncate" => Some(Self::Truncate),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    pub(crate) fn to_sqlx(self) -> sqlx::sqlite::SqliteJournalMode {
        match self {
            Self::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            Self::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            Self::Truncate => sqlx::sqlite::SqliteJournalMode::Truncate,
            Self::Memory => sqlx::sqlite::SqliteJournalMode::Memory,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, DbConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| DbConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}
