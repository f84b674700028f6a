use crate::error::Result;
use sqlx::SqliteConnection;

/// Searchable columns of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FtsEntry {
    pub path: String,
    pub title: String,
    pub headings: String,
    pub body: String,
    pub code: String,
}

/// A raw full-text hit; lower scores rank better.
#[derive(Debug, Clone, PartialEq)]
pub struct FtsHit {
    pub path: String,
    pub score: f64,
}

/// bm25 weights in column order: path, title, headings, body, code.
pub(crate) const BM25_WEIGHTS: &str = "0.0, 10.0, 5.0, 1.0, 2.0";

/// Replaces the entry for `entry.path`, keeping at most one row per path.
pub(crate) async fn replace_entry(conn: &mut SqliteConnection, entry: &FtsEntry) -> Result<()> {
    delete_entry(&mut *conn, &entry.path).await?;
    sqlx::query(
        "INSERT INTO documents_fts (path, title, headings, body, code) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.path)
    .bind(&entry.title)
    .bind(&entry.headings)
    .bind(&entry.body)
    .bind(&entry.code)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn delete_entry(conn: &mut SqliteConnection, path: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents_fts WHERE path = ?")
        .bind(path)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn clear(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM documents_fts")
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn entry_count(conn: &mut SqliteConnection, path: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents_fts WHERE path = ?")
        .bind(path)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Runs `match_expression` directly against the full-text table.
pub(crate) async fn search(
    conn: &mut SqliteConnection,
    match_expression: &str,
    limit: i64,
) -> Result<Vec<FtsHit>> {
    let sql = format!(
        "SELECT path, bm25(documents_fts, {BM25_WEIGHTS}) AS score \
         FROM documents_fts WHERE documents_fts MATCH ? ORDER BY score LIMIT ?"
    );
    let rows = sqlx::query_as::<_, (String, f64)>(&sql)
        .bind(match_expression)
        .bind(limit)
        .fetch_all(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(path, score)| FtsHit { path, score })
        .collect())
}
