use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::db::{from_millis, to_millis};
use crate::error::EngineResult;

/// A badge as authored in `badge_definitions`. `criteria_value` is the raw JSON payload;
/// interpretation happens in the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria_type: String,
    pub criteria_value: String,
    pub xp_value: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    pub award_id: String,
    pub badge_id: String,
    pub name: String,
    pub description: String,
    pub xp_value: i64,
    pub earned_at: DateTime<Utc>,
}

const DEFINITION_COLUMNS: &str = r#"b."id" as "id", b."name" as "name",
    b."description" as "description", b."criteriaType" as "criteriaType",
    b."criteriaValue" as "criteriaValue", b."xpValue" as "xpValue", b."isActive" as "isActive""#;

pub async fn list_active(conn: &mut SqliteConnection) -> EngineResult<Vec<BadgeDefinition>> {
    let sql = format!(
        r#"SELECT {DEFINITION_COLUMNS} FROM "badge_definitions" b
           WHERE b."isActive" = 1 ORDER BY b."id""#
    );
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter().map(map_definition).collect()
}

/// Active badges the learner has not earned yet.
pub async fn list_active_unearned(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> EngineResult<Vec<BadgeDefinition>> {
    let sql = format!(
        r#"SELECT {DEFINITION_COLUMNS} FROM "badge_definitions" b
           WHERE b."isActive" = 1
             AND NOT EXISTS (
               SELECT 1 FROM "badge_awards" a
               WHERE a."badgeId" = b."id" AND a."learnerId" = $1
             )
           ORDER BY b."id""#
    );
    let rows = sqlx::query(&sql)
        .bind(learner_id)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(map_definition).collect()
}

pub async fn find_definition(
    conn: &mut SqliteConnection,
    badge_id: &str,
) -> EngineResult<Option<BadgeDefinition>> {
    let sql = format!(r#"SELECT {DEFINITION_COLUMNS} FROM "badge_definitions" b WHERE b."id" = $1"#);
    let row = sqlx::query(&sql)
        .bind(badge_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(map_definition).transpose()
}

/// Inserts a definition unless one with the same id exists.
pub async fn insert_definition_if_absent(
    conn: &mut SqliteConnection,
    badge: &BadgeDefinition,
) -> EngineResult<bool> {
    let result = sqlx::query(
        r#"INSERT INTO "badge_definitions"
             ("id","name","description","criteriaType","criteriaValue","xpValue","isActive")
           VALUES ($1,$2,$3,$4,$5,$6,$7)
           ON CONFLICT ("id") DO NOTHING"#,
    )
    .bind(&badge.id)
    .bind(&badge.name)
    .bind(&badge.description)
    .bind(&badge.criteria_type)
    .bind(&badge.criteria_value)
    .bind(badge.xp_value)
    .bind(badge.is_active)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records the award. Returns the new award id, or `None` when the learner already holds
/// the badge (the unique key on learner and badge decides).
pub async fn insert_award(
    conn: &mut SqliteConnection,
    learner_id: &str,
    badge_id: &str,
    earned_at: DateTime<Utc>,
) -> EngineResult<Option<String>> {
    let award_id = Uuid::new_v4().to_string();
    let result = sqlx::query(
        r#"INSERT INTO "badge_awards" ("id","learnerId","badgeId","earnedAt")
           VALUES ($1,$2,$3,$4)
           ON CONFLICT ("learnerId","badgeId") DO NOTHING"#,
    )
    .bind(&award_id)
    .bind(learner_id)
    .bind(badge_id)
    .bind(to_millis(earned_at))
    .execute(&mut *conn)
    .await?;

    Ok((result.rows_affected() == 1).then_some(award_id))
}

pub async fn list_earned(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> EngineResult<Vec<EarnedBadge>> {
    let rows = sqlx::query(
        r#"SELECT a."id" as "awardId", a."badgeId" as "badgeId", a."earnedAt" as "earnedAt",
                  b."name" as "name", b."description" as "description", b."xpValue" as "xpValue"
           FROM "badge_awards" a
           JOIN "badge_definitions" b ON b."id" = a."badgeId"
           WHERE a."learnerId" = $1
           ORDER BY a."earnedAt" DESC, a."badgeId" ASC"#,
    )
    .bind(learner_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(EarnedBadge {
                award_id: row.try_get("awardId")?,
                badge_id: row.try_get("badgeId")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                xp_value: row.try_get("xpValue")?,
                earned_at: from_millis(row.try_get("earnedAt")?),
            })
        })
        .collect()
}

/// badge id -> earned time for one learner.
pub async fn earned_map(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> EngineResult<HashMap<String, DateTime<Utc>>> {
    let rows = sqlx::query(r#"SELECT "badgeId","earnedAt" FROM "badge_awards" WHERE "learnerId" = $1"#)
        .bind(learner_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut out = HashMap::with_capacity(rows.len());
    for row in &rows {
        let badge_id: String = row.try_get("badgeId")?;
        let earned_at: i64 = row.try_get("earnedAt")?;
        out.insert(badge_id, from_millis(earned_at));
    }
    Ok(out)
}

pub async fn count_earned(conn: &mut SqliteConnection, learner_id: &str) -> EngineResult<i64> {
    let count: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "badge_awards" WHERE "learnerId" = $1"#)
            .bind(learner_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

fn map_definition(row: &SqliteRow) -> EngineResult<BadgeDefinition> {
    Ok(BadgeDefinition {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        criteria_type: row.try_get("criteriaType")?,
        criteria_value: row.try_get("criteriaValue")?,
        xp_value: row.try_get("xpValue")?,
        is_active: row.try_get("isActive")?,
    })
}
