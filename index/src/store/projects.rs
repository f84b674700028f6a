use crate::error::Result;
use sqlx::FromRow;
use sqlx::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProjectRecord {
    pub alias: String,
    pub dir_name: String,
    pub created_at: i64,
}

/// Creates the project on first sight; later calls only refresh `dir_name`.
pub(crate) async fn upsert_project(
    conn: &mut SqliteConnection,
    alias: &str,
    dir_name: &str,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (alias, dir_name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(alias) DO UPDATE SET dir_name = excluded.dir_name
        "#,
    )
    .bind(alias)
    .bind(dir_name)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn get_project(
    conn: &mut SqliteConnection,
    alias: &str,
) -> Result<Option<ProjectRecord>> {
    let record = sqlx::query_as::<_, ProjectRecord>(
        "SELECT alias, dir_name, created_at FROM projects WHERE alias = ?",
    )
    .bind(alias)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

pub(crate) async fn delete_all_projects(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM projects").execute(conn).await?;
    Ok(result.rows_affected())
}
