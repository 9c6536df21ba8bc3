use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::db::{from_millis, to_millis};
use crate::error::{EngineError, EngineResult};

const RECORD_COLUMNS: &str = r#""id","learnerId","contentId","masteryLevel","reviewCount",
    "lastReviewedAt","nextReviewDueAt","version","createdAt","updatedAt""#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub id: String,
    pub learner_id: String,
    pub content_id: Option<String>,
    pub mastery_level: i64,
    pub review_count: i64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_due_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMasteryRecord<'a> {
    pub learner_id: &'a str,
    pub content_id: &'a str,
    pub mastery_level: i64,
    pub review_count: i64,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct MasteryUpdate {
    pub mastery_level: i64,
    pub review_count: i64,
    pub last_reviewed_at: DateTime<Utc>,
    pub next_review_due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MasteryCounts {
    pub total_items: i64,
    pub mastery_sum: i64,
    pub items_mastered: i64,
    pub items_in_progress: i64,
    pub items_due_review: i64,
}

pub async fn find(
    conn: &mut SqliteConnection,
    learner_id: &str,
    content_id: &str,
) -> EngineResult<Option<MasteryRecord>> {
    let sql = format!(
        r#"SELECT {RECORD_COLUMNS} FROM "mastery_records"
           WHERE "learnerId" = $1 AND "contentId" = $2 LIMIT 1"#
    );
    let row = sqlx::query(&sql)
        .bind(learner_id)
        .bind(content_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Inserts a record unless the pair already exists. Returns whether a row was written.
pub async fn insert_if_absent(
    conn: &mut SqliteConnection,
    record: &NewMasteryRecord<'_>,
    now: DateTime<Utc>,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"INSERT INTO "mastery_records"
             ("id","learnerId","contentId","masteryLevel","reviewCount",
              "lastReviewedAt","nextReviewDueAt","version","createdAt","updatedAt")
           VALUES ($1,$2,$3,$4,$5,$6,$7,0,$8,$8)
           ON CONFLICT ("learnerId","contentId") DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(record.learner_id)
    .bind(record.content_id)
    .bind(record.mastery_level)
    .bind(record.review_count)
    .bind(record.last_reviewed_at.map(to_millis))
    .bind(to_millis(record.next_review_due_at))
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Writes a new estimate and due date as one row update, guarded by `expected_version`.
pub async fn apply_update(
    conn: &mut SqliteConnection,
    record_id: &str,
    expected_version: i64,
    update: &MasteryUpdate,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    let result = sqlx::query(
        r#"UPDATE "mastery_records"
           SET "masteryLevel" = $1, "reviewCount" = $2, "lastReviewedAt" = $3,
               "nextReviewDueAt" = $4, "version" = "version" + 1, "updatedAt" = $5
           WHERE "id" = $6 AND "version" = $7"#,
    )
    .bind(update.mastery_level)
    .bind(update.review_count)
    .bind(to_millis(update.last_reviewed_at))
    .bind(to_millis(update.next_review_due_at))
    .bind(to_millis(now))
    .bind(record_id)
    .bind(expected_version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::Conflict(format!(
            "mastery record {record_id} changed since version {expected_version}"
        )));
    }
    Ok(())
}

/// Records due at or before `now`, earliest due first.
pub async fn list_due(
    conn: &mut SqliteConnection,
    learner_id: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> EngineResult<Vec<MasteryRecord>> {
    let sql = format!(
        r#"SELECT {RECORD_COLUMNS} FROM "mastery_records"
           WHERE "learnerId" = $1
             AND "nextReviewDueAt" IS NOT NULL
             AND "nextReviewDueAt" <= $2
           ORDER BY "nextReviewDueAt" ASC, "id" ASC
           LIMIT $3"#
    );
    let rows = sqlx::query(&sql)
        .bind(learner_id)
        .bind(to_millis(now))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_row).collect()
}

/// Aggregates for one learner. `mastered_from` and `in_progress_from` are the inclusive
/// lower bounds of the two bands; in-progress ends where mastered begins.
pub async fn count_by_band(
    conn: &mut SqliteConnection,
    learner_id: &str,
    now: DateTime<Utc>,
    mastered_from: i64,
    in_progress_from: i64,
) -> EngineResult<MasteryCounts> {
    let row = sqlx::query(
        r#"
        SELECT
          COUNT(*) as "total",
          COALESCE(SUM("masteryLevel"), 0) as "masterySum",
          COALESCE(SUM(CASE WHEN "masteryLevel" >= $3 THEN 1 ELSE 0 END), 0) as "mastered",
          COALESCE(SUM(CASE WHEN "masteryLevel" >= $4 AND "masteryLevel" < $3 THEN 1 ELSE 0 END), 0) as "inProgress",
          COALESCE(SUM(CASE WHEN "nextReviewDueAt" IS NOT NULL AND "nextReviewDueAt" <= $2 THEN 1 ELSE 0 END), 0) as "due"
        FROM "mastery_records"
        WHERE "learnerId" = $1
        "#,
    )
    .bind(learner_id)
    .bind(to_millis(now))
    .bind(mastered_from)
    .bind(in_progress_from)
    .fetch_one(&mut *conn)
    .await?;

    Ok(MasteryCounts {
        total_items: row.try_get("total")?,
        mastery_sum: row.try_get("masterySum")?,
        items_mastered: row.try_get("mastered")?,
        items_in_progress: row.try_get("inProgress")?,
        items_due_review: row.try_get("due")?,
    })
}

pub async fn mastery_levels(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> EngineResult<HashMap<String, i64>> {
    let rows = sqlx::query(
        r#"SELECT "contentId","masteryLevel" FROM "mastery_records"
           WHERE "learnerId" = $1 AND "contentId" IS NOT NULL"#,
    )
    .bind(learner_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in &rows {
        let content_id: String = row.try_get("contentId")?;
        let level: i64 = row.try_get("masteryLevel")?;
        out.insert(content_id, level);
    }
    Ok(out)
}

fn map_row(row: &SqliteRow) -> EngineResult<MasteryRecord> {
    let last_reviewed: Option<i64> = row.try_get("lastReviewedAt")?;
    let next_due: Option<i64> = row.try_get("nextReviewDueAt")?;
    Ok(MasteryRecord {
        id: row.try_get("id")?,
        learner_id: row.try_get("learnerId")?,
        content_id: row.try_get("contentId")?,
        mastery_level: row.try_get("masteryLevel")?,
        review_count: row.try_get("reviewCount")?,
        last_reviewed_at: last_reviewed.map(from_millis),
        next_review_due_at: next_due.map(from_millis),
        version: row.try_get("version")?,
        created_at: from_millis(row.try_get("createdAt")?),
        updated_at: from_millis(row.try_get("updatedAt")?),
    })
}
