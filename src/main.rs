use std::process::ExitCode;

use mastery_progression::config::Config;
use mastery_progression::db::Database;
use mastery_progression::{logging, seed};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = logging::init_tracing(&config.log);

    let db = match Database::connect(&config.db).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "failed to open progression store");
            return ExitCode::FAILURE;
        }
    };

    if config.seed_default_badges {
        if let Err(err) = seed::seed_default_badges(&db).await {
            tracing::error!(error = %err, "failed to seed default badges");
            db.close().await;
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(path = %config.db.path.display(), "progression store initialized");
    db.close().await;
    ExitCode::SUCCESS
}
