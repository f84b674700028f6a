use crate::error::Result;
use sqlx::SqliteConnection;

/// Replaces every tag of `path` with `tags`.
pub(crate) async fn replace_tags(
    conn: &mut SqliteConnection,
    path: &str,
    tags: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM document_tags WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    for tag in tags {
        sqlx::query("INSERT OR IGNORE INTO document_tags (path, tag) VALUES (?, ?)")
            .bind(path)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn tags_for(conn: &mut SqliteConnection, path: &str) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar::<_, String>(
        "SELECT tag FROM document_tags WHERE path = ? ORDER BY tag",
    )
    .bind(path)
    .fetch_all(conn)
    .await?;
    Ok(tags)
}
