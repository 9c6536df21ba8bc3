use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::db::to_millis;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProgress {
    pub learner_id: String,
    pub xp: i64,
    pub level: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    #[serde(skip)]
    pub version: i64,
}

pub async fn find(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> EngineResult<Option<LearnerProgress>> {
    let row = sqlx::query(
        r#"SELECT "id","xp","level","currentStreak","longestStreak","lastActivityDate","version"
           FROM "learners" WHERE "id" = $1 LIMIT 1"#,
    )
    .bind(learner_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn require(conn: &mut SqliteConnection, learner_id: &str) -> EngineResult<LearnerProgress> {
    find(conn, learner_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("learner {learner_id}")))
}

pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    learner_id: &str,
    now: DateTime<Utc>,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"INSERT INTO "learners" ("id","createdAt","updatedAt") VALUES ($1,$2,$2)
           ON CONFLICT ("id") DO NOTHING"#,
    )
    .bind(learner_id)
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn store_xp(
    conn: &mut SqliteConnection,
    learner: &LearnerProgress,
    xp: i64,
    level: i64,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"UPDATE "learners"
           SET "xp" = $1, "level" = $2, "version" = "version" + 1, "updatedAt" = $3
           WHERE "id" = $4 AND "version" = $5"#,
    )
    .bind(xp)
    .bind(level)
    .bind(to_millis(now))
    .bind(&learner.learner_id)
    .bind(learner.version)
    .execute(&mut *conn)
    .await?;
    ensure_written(result.rows_affected(), learner)
}

pub async fn store_streak(
    conn: &mut SqliteConnection,
    learner: &LearnerProgress,
    current_streak: i64,
    longest_streak: i64,
    last_activity_date: NaiveDate,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"UPDATE "learners"
           SET "currentStreak" = $1, "longestStreak" = $2, "lastActivityDate" = $3,
               "version" = "version" + 1, "updatedAt" = $4
           WHERE "id" = $5 AND "version" = $6"#,
    )
    .bind(current_streak)
    .bind(longest_streak)
    .bind(last_activity_date)
    .bind(to_millis(now))
    .bind(&learner.learner_id)
    .bind(learner.version)
    .execute(&mut *conn)
    .await?;
    ensure_written(result.rows_affected(), learner)
}

fn ensure_written(rows_affected: u64, learner: &LearnerProgress) -> EngineResult<()> {
    if rows_affected == 0 {
        return Err(EngineError::Conflict(format!(
            "learner {} changed since version {}",
            learner.learner_id, learner.version
        )));
    }
    Ok(())
}

fn map_row(row: &SqliteRow) -> EngineResult<LearnerProgress> {
    Ok(LearnerProgress {
        learner_id: row.try_get("id")?,
        xp: row.try_get("xp")?,
        level: row.try_get("level")?,
        current_streak: row.try_get("currentStreak")?,
        longest_streak: row.try_get("longestStreak")?,
        last_activity_date: row.try_get("lastActivityDate")?,
        version: row.try_get("version")?,
    })
}
