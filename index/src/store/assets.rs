use crate::error::Result;
use sqlx::SqliteConnection;

pub(crate) async fn register_asset(
    conn: &mut SqliteConnection,
    path: &str,
    project_alias: &str,
    size: i64,
    now: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assets (path, project_alias, size, registered_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            project_alias = excluded.project_alias,
            size = excluded.size,
            registered_at = excluded.registered_at
        "#,
    )
    .bind(path)
    .bind(project_alias)
    .bind(size)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn remove_asset(conn: &mut SqliteConnection, path: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM assets WHERE path = ?")
        .bind(path)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn asset_paths(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let paths = sqlx::query_scalar::<_, String>("SELECT path FROM assets ORDER BY path")
        .fetch_all(conn)
        .await?;
    Ok(paths)
}

/// Replaces the asset references of `document_path`.
///
/// Only registered assets are linked; unknown targets are skipped rather
/// than violating the foreign key.
pub(crate) async fn replace_asset_refs(
    conn: &mut SqliteConnection,
    document_path: &str,
    asset_paths: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM document_assets WHERE document_path = ?")
        .bind(document_path)
        .execute(&mut *conn)
        .await?;
    for asset_path in asset_paths {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO document_assets (document_path, asset_path)
            SELECT ?, path FROM assets WHERE path = ?
            "#,
        )
        .bind(document_path)
        .bind(asset_path)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) async fn asset_refs_for(
    conn: &mut SqliteConnection,
    document_path: &str,
) -> Result<Vec<String>> {
    let paths = sqlx::query_scalar::<_, String>(
        "SELECT asset_path FROM document_assets WHERE document_path = ? ORDER BY asset_path",
    )
    .bind(document_path)
    .fetch_all(conn)
    .await?;
    Ok(paths)
}
