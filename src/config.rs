use crate::db::config::{DbConfig, DbConfigError};
use crate::logging::LogConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub log: LogConfig,
    pub seed_default_badges: bool,
    pub db: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let seed_default_badges = std::env::var("SEED_DEFAULT_BADGES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            log: LogConfig::from_env(),
            seed_default_badges,
            db: DbConfig::from_env()?,
        })
    }
}
