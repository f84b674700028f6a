use crate::error::Result;
use sqlx::FromRow;
use sqlx::SqliteConnection;
use std::collections::HashMap;

/// Relational record of an indexed document. A cache of the file on disk.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DocumentRecord {
    pub path: String,
    pub project_alias: String,
    pub title: String,
    pub has_code: bool,
    pub has_links: bool,
    pub size: i64,
    /// Milliseconds since the Unix epoch.
    pub modified_at: i64,
    pub indexed_at: i64,
    /// Set when the document was removed from search but its record kept.
    pub deleted_at: Option<i64>,
}

impl DocumentRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// File state last seen by the indexer, used to skip unchanged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStamp {
    pub size: i64,
    pub modified_at: i64,
    pub deleted: bool,
}

/// Inserts or replaces the record and clears any soft-delete marker.
pub(crate) async fn upsert_document(
    conn: &mut SqliteConnection,
    record: &DocumentRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents
            (path, project_alias, title, has_code, has_links, size, modified_at, indexed_at, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
        ON CONFLICT(path) DO UPDATE SET
            project_alias = excluded.project_alias,
            title = excluded.title,
            has_code = excluded.has_code,
            has_links = excluded.has_links,
            size = excluded.size,
            modified_at = excluded.modified_at,
            indexed_at = excluded.indexed_at,
            deleted_at = NULL
        "#,
    )
    .bind(&record.path)
    .bind(&record.project_alias)
    .bind(&record.title)
    .bind(record.has_code)
    .bind(record.has_links)
    .bind(record.size)
    .bind(record.modified_at)
    .bind(record.indexed_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn get_document(
    conn: &mut SqliteConnection,
    path: &str,
) -> Result<Option<DocumentRecord>> {
    let record = sqlx::query_as::<_, DocumentRecord>(
        r#"
        SELECT path, project_alias, title, has_code, has_links, size, modified_at, indexed_at, deleted_at
        FROM documents
        WHERE path = ?
        "#,
    )
    .bind(path)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Returns whether a record existed. Derived rows go with it by cascade.
pub(crate) async fn delete_document(conn: &mut SqliteConnection, path: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE path = ?")
        .bind(path)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn mark_deleted(
    conn: &mut SqliteConnection,
    path: &str,
    now: i64,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE documents SET deleted_at = ? WHERE path = ? AND deleted_at IS NULL")
            .bind(now)
            .bind(path)
            .execute(conn)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn document_stamps(
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, DocumentStamp>> {
    let rows = sqlx::query_as::<_, (String, i64, i64, Option<i64>)>(
        "SELECT path, size, modified_at, deleted_at FROM documents",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(path, size, modified_at, deleted_at)| {
            (
                path,
                DocumentStamp {
                    size,
                    modified_at,
                    deleted: deleted_at.is_some(),
                },
            )
        })
        .collect())
}

pub(crate) async fn delete_all_documents(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM documents").execute(conn).await?;
    Ok(result.rows_affected())
}
