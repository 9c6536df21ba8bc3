#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use mastery_progression::db::config::DbConfig;
use mastery_progression::db::operations::badge::{self, BadgeDefinition};
use mastery_progression::db::operations::content::{self, ContentSummary};
use mastery_progression::{Database, FixedClock, ProgressionEngine};

pub struct TestEngine {
    pub engine: ProgressionEngine,
    pub clock: FixedClock,
    _dir: TempDir,
}

impl TestEngine {
    pub fn db(&self) -> &Database {
        self.engine.db()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap()
}

pub async fn setup() -> TestEngine {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = DbConfig::at_path(dir.path().join("progression.db"));
    let db = Database::connect(&config)
        .await
        .expect("failed to open test database");

    let clock = FixedClock::new(start_time());
    let engine = ProgressionEngine::new(db, Arc::new(clock.clone()));

    TestEngine {
        engine,
        clock,
        _dir: dir,
    }
}

pub async fn add_content(db: &Database, id: &str, title: &str) {
    let mut conn = db.pool().acquire().await.expect("acquire");
    content::upsert_summary(
        &mut conn,
        &ContentSummary {
            id: id.to_string(),
            title: title.to_string(),
            content_type: "lesson".to_string(),
        },
    )
    .await
    .expect("insert content");
}

pub async fn add_badge(
    db: &Database,
    id: &str,
    criteria_type: &str,
    criteria_value: serde_json::Value,
    xp_value: i64,
) {
    add_badge_with_state(db, id, criteria_type, criteria_value, xp_value, true).await;
}

pub async fn add_badge_with_state(
    db: &Database,
    id: &str,
    criteria_type: &str,
    criteria_value: serde_json::Value,
    xp_value: i64,
    is_active: bool,
) {
    let mut conn = db.pool().acquire().await.expect("acquire");
    let inserted = badge::insert_definition_if_absent(
        &mut conn,
        &BadgeDefinition {
            id: id.to_string(),
            name: format!("badge {id}"),
            description: String::new(),
            criteria_type: criteria_type.to_string(),
            criteria_value: criteria_value.to_string(),
            xp_value,
            is_active,
        },
    )
    .await
    .expect("insert badge");
    assert!(inserted, "badge {id} already existed");
}

pub fn xp_badge(threshold: i64) -> serde_json::Value {
    json!({ "threshold": threshold })
}
