/// Statements creating the index schema, applied in order on open.
///
/// Derived rows hang off `documents` with `ON DELETE CASCADE`; the
/// full-text table has no foreign keys and is maintained explicitly.
pub(crate) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        alias TEXT PRIMARY KEY,
        dir_name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        path TEXT PRIMARY KEY,
        project_alias TEXT NOT NULL REFERENCES projects(alias) ON DELETE CASCADE,
        title TEXT NOT NULL,
        has_code INTEGER NOT NULL DEFAULT 0,
        has_links INTEGER NOT NULL DEFAULT 0,
        size INTEGER NOT NULL,
        modified_at INTEGER NOT NULL,
        indexed_at INTEGER NOT NULL,
        deleted_at INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_alias)",
    "CREATE INDEX IF NOT EXISTS idx_documents_modified ON documents(modified_at)",
    r#"
    CREATE TABLE IF NOT EXISTS document_tags (
        path TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (path, tag)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_document_tags_tag ON document_tags(tag)",
    r#"
    CREATE TABLE IF NOT EXISTS document_links (
        path TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE,
        url TEXT NOT NULL,
        host TEXT,
        PRIMARY KEY (path, url)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_document_links_host ON document_links(host)",
    r#"
    CREATE TABLE IF NOT EXISTS assets (
        path TEXT PRIMARY KEY,
        project_alias TEXT NOT NULL REFERENCES projects(alias) ON DELETE CASCADE,
        size INTEGER NOT NULL,
        registered_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_assets (
        document_path TEXT NOT NULL REFERENCES documents(path) ON DELETE CASCADE,
        asset_path TEXT NOT NULL REFERENCES assets(path) ON DELETE CASCADE,
        PRIMARY KEY (document_path, asset_path)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_document_assets_asset ON document_assets(asset_path)",
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
        path UNINDEXED,
        title,
        headings,
        body,
        code,
        tokenize = 'unicode61 remove_diacritics 2'
    )
    "#,
];
