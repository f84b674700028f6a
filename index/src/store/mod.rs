//! SQLite storage for the vault index.
//!
//! Table access lives in one module per table; each function takes a plain
//! connection so callers can compose them inside a single transaction.

mod assets;
mod documents;
mod fts;
mod links;
mod projects;
mod schema;
mod tags;

pub(crate) use assets::register_asset;
pub(crate) use assets::remove_asset;
pub(crate) use assets::replace_asset_refs;
pub(crate) use documents::delete_all_documents;
pub(crate) use documents::delete_document;
pub(crate) use documents::mark_deleted;
pub(crate) use documents::upsert_document;
pub(crate) use fts::BM25_WEIGHTS;
pub(crate) use fts::clear as clear_fts;
pub(crate) use fts::delete_entry as delete_fts_entry;
pub(crate) use fts::replace_entry as replace_fts_entry;
pub(crate) use links::replace_links;
pub(crate) use projects::delete_all_projects;
pub(crate) use projects::upsert_project;
pub(crate) use tags::replace_tags;

pub use documents::DocumentRecord;
pub use documents::DocumentStamp;
pub use fts::FtsEntry;
pub use fts::FtsHit;
pub use projects::ProjectRecord;

use crate::document::Link;
use crate::error::Result;
use schema::SCHEMA;
use serde::Serialize;
use sqlx::Sqlite;
use sqlx::SqlitePool;
use sqlx::Transaction;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteSynchronous;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Row counts reported by `vault status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub projects: i64,
    pub documents: i64,
    pub deleted_documents: i64,
    pub tags: i64,
    pub links: i64,
    pub assets: i64,
}

/// Handle to the index database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, 8).await
    }

    /// Opens (creating if needed) the database at `path` and applies the
    /// schema.
    pub async fn open_with(path: &Path, max_connections: u32) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let mut conn = pool.acquire().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        drop(conn);

        debug!(path = %path.display(), "opened index store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a transaction. The first statement of every write transaction
    /// must be a write so the database lock is taken up front.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn get_document(&self, path: &str) -> Result<Option<DocumentRecord>> {
        let mut conn = self.pool.acquire().await?;
        documents::get_document(&mut conn, path).await
    }

    pub async fn get_project(&self, alias: &str) -> Result<Option<ProjectRecord>> {
        let mut conn = self.pool.acquire().await?;
        projects::get_project(&mut conn, alias).await
    }

    pub async fn tags_for(&self, path: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        tags::tags_for(&mut conn, path).await
    }

    pub async fn links_for(&self, path: &str) -> Result<Vec<Link>> {
        let mut conn = self.pool.acquire().await?;
        links::links_for(&mut conn, path).await
    }

    pub async fn asset_refs_for(&self, path: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        assets::asset_refs_for(&mut conn, path).await
    }

    /// Number of full-text rows for `path`; 0 or 1 in a consistent index.
    pub async fn fts_entry_count(&self, path: &str) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        fts::entry_count(&mut conn, path).await
    }

    pub async fn document_stamps(&self) -> Result<HashMap<String, DocumentStamp>> {
        let mut conn = self.pool.acquire().await?;
        documents::document_stamps(&mut conn).await
    }

    pub async fn asset_paths(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        assets::asset_paths(&mut conn).await
    }

    /// Unfiltered full-text search, best match first.
    pub async fn search_raw(&self, match_expression: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let mut conn = self.pool.acquire().await?;
        fts::search(&mut conn, match_expression, limit).await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM documents WHERE deleted_at IS NULL),
                (SELECT COUNT(*) FROM documents WHERE deleted_at IS NOT NULL),
                (SELECT COUNT(*) FROM document_tags),
                (SELECT COUNT(*) FROM document_links),
                (SELECT COUNT(*) FROM assets)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            projects: row.0,
            documents: row.1,
            deleted_documents: row.2,
            tags: row.3,
            links: row.4,
            assets: row.5,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
