use sqlx::SqlitePool;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_progression_schema",
    include_str!("../../sql/001_progression_schema.sql"),
)];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "name" TEXT NOT NULL UNIQUE,
            "appliedAt" TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    for (name, sql) in MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            tracing::debug!(migration = name, "already applied");
            continue;
        }

        tracing::info!(migration = name, "applying migration");
        let mut tx = pool.begin().await?;
        for stmt in split_sql_statements(sql) {
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Statement {
                    migration: name,
                    source,
                })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

/// Breaks a migration script into executable statements. `--` comments are dropped
/// and `;` only terminates a statement outside quoted identifiers and literals.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '-') if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                current.push('\n');
                continue;
            }
            (None, ';') => {
                push_statement(&mut statements, &current);
                current.clear();
                continue;
            }
            (None, _) => {}
        }
        current.push(ch);
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, body: &str) {
    let body = body.trim();
    if !body.is_empty() {
        statements.push(body.to_string());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration {migration} failed: {source}")]
    Statement {
        migration: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ignores_semicolons_in_literals() {
        let sql = r#"INSERT INTO "t" ("v") VALUES ('a;b'); CREATE TABLE "x;y" ("id" TEXT);"#;
        let parts = split_sql_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains("'a;b'"));
        assert!(parts[1].starts_with("CREATE TABLE"));
    }

    #[test]
    fn split_drops_comments_outside_literals() {
        let sql = "-- header; with a semicolon\nCREATE TABLE \"a\" (\"v\" TEXT DEFAULT '--x'); -- tail\n-- only a comment";
        let parts = split_sql_statements(sql);
        assert_eq!(parts, vec![r#"CREATE TABLE "a" ("v" TEXT DEFAULT '--x')"#.to_string()]);
    }

    #[test]
    fn bundled_schema_has_all_tables() {
        let (_, sql) = MIGRATIONS[0];
        let statements = split_sql_statements(sql);
        for table in [
            "learners",
            "contents",
            "mastery_records",
            "badge_definitions",
            "badge_awards",
        ] {
            let needle = format!(r#"CREATE TABLE IF NOT EXISTS "{table}""#);
            assert!(
                statements.iter().any(|s| s.contains(&needle)),
                "missing table {table}"
            );
        }
    }
}
