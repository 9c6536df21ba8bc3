use serde::Serialize;
use sqlx::{Row, SqliteConnection};

use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub id: String,
    pub title: String,
    pub content_type: String,
}

pub async fn find_summary(
    conn: &mut SqliteConnection,
    content_id: &str,
) -> EngineResult<Option<ContentSummary>> {
    let row = sqlx::query(
        r#"SELECT "id","title","contentType" FROM "contents" WHERE "id" = $1 LIMIT 1"#,
    )
    .bind(content_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(ContentSummary {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content_type: row.try_get("contentType")?,
    }))
}

/// Mirrors a catalogue entry into the local lookup table.
pub async fn upsert_summary(conn: &mut SqliteConnection, content: &ContentSummary) -> EngineResult<()> {
    sqlx::query(
        r#"INSERT INTO "contents" ("id","title","contentType") VALUES ($1,$2,$3)
           ON CONFLICT ("id") DO UPDATE SET
             "title" = excluded."title",
             "contentType" = excluded."contentType""#,
    )
    .bind(&content.id)
    .bind(&content.title)
    .bind(&content.content_type)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
