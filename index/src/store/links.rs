use crate::document::Link;
use crate::error::Result;
use sqlx::SqliteConnection;

pub(crate) async fn replace_links(
    conn: &mut SqliteConnection,
    path: &str,
    links: &[Link],
) -> Result<()> {
    sqlx::query("DELETE FROM document_links WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    for link in links {
        sqlx::query("INSERT OR IGNORE INTO document_links (path, url, host) VALUES (?, ?, ?)")
            .bind(path)
            .bind(&link.url)
            .bind(link.host.as_deref())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn links_for(conn: &mut SqliteConnection, path: &str) -> Result<Vec<Link>> {
    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT url, host FROM document_links WHERE path = ? ORDER BY url",
    )
    .bind(path)
    .fetch_all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(url, host)| Link { url, host })
        .collect())
}
