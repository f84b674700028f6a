use crate::error::Result;
use crate::error::VaultError;
use crate::store::BM25_WEIGHTS;
use crate::store::IndexStore;
use serde::Serialize;
use sqlx::FromRow;
use sqlx::QueryBuilder;
use sqlx::Sqlite;
use tracing::debug;
use vault_query::ExtractedFilters;
use vault_query::MATCH_ALL;

/// A ranked search result. Lower scores are better matches.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SearchHit {
    pub path: String,
    pub project_alias: String,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub limit: usize,
    /// Only affects match-all queries; deleted documents have no full-text
    /// entry.
    pub include_deleted: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            include_deleted: false,
        }
    }
}

/// A query compiled to what the store executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledSearch {
    pub query: String,
    pub match_expression: String,
    pub filters: ExtractedFilters,
}

impl CompiledSearch {
    pub fn matches_everything(&self) -> bool {
        self.match_expression == MATCH_ALL
    }
}

pub fn compile_search(query: &str) -> Result<CompiledSearch> {
    let parsed = vault_query::parse(query)?;
    Ok(CompiledSearch {
        query: query.to_string(),
        match_expression: parsed.to_fts5(),
        filters: parsed.extract_filters(),
    })
}

/// Runs search-language queries against the index.
///
/// Project filters are OR'd together, as are tag filters; a document must
/// satisfy both groups when both are present.
#[derive(Debug, Clone)]
pub struct SearchService {
    store: IndexStore,
    default_limit: usize,
}

impl SearchService {
    pub fn new(store: IndexStore, default_limit: usize) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    pub fn default_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.default_limit,
            ..Default::default()
        }
    }

    pub async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchHit>> {
        let compiled = compile_search(query)?;
        self.search_compiled(&compiled, options).await
    }

    /// Compiles without executing, for diagnostics.
    pub fn explain(&self, query: &str) -> Result<CompiledSearch> {
        compile_search(query)
    }

    pub async fn search_compiled(
        &self,
        compiled: &CompiledSearch,
        options: SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let limit = i64::try_from(options.limit).unwrap_or(i64::MAX);
        let mut builder: QueryBuilder<Sqlite> = if compiled.matches_everything() {
            let mut builder = QueryBuilder::new(
                "SELECT d.path, d.project_alias, d.title, 0.0 AS score FROM documents d WHERE 1 = 1",
            );
            if !options.include_deleted {
                builder.push(" AND d.deleted_at IS NULL");
            }
            builder
        } else {
            let mut builder = QueryBuilder::new(format!(
                "SELECT d.path, d.project_alias, d.title, bm25(documents_fts, {BM25_WEIGHTS}) AS score \
                 FROM documents_fts JOIN documents d ON d.path = documents_fts.path \
                 WHERE d.deleted_at IS NULL AND documents_fts MATCH "
            ));
            builder.push_bind(compiled.match_expression.clone());
            builder
        };

        push_filters(&mut builder, &compiled.filters);
        if compiled.matches_everything() {
            builder.push(" ORDER BY d.modified_at DESC, d.path");
        } else {
            builder.push(" ORDER BY score, d.path");
        }
        builder.push(" LIMIT ").push_bind(limit);

        let hits = builder
            .build_query_as::<SearchHit>()
            .fetch_all(self.store.pool())
            .await
            .map_err(|err| translate_engine_error(compiled, err))?;
        debug!(
            query = %compiled.query,
            fts = %compiled.match_expression,
            hits = hits.len(),
            "search"
        );
        Ok(hits)
    }
}

fn push_filters(builder: &mut QueryBuilder<Sqlite>, filters: &ExtractedFilters) {
    if !filters.projects.is_empty() {
        builder.push(" AND d.project_alias IN (");
        let mut values = builder.separated(", ");
        for project in &filters.projects {
            values.push_bind(project.clone());
        }
        values.push_unseparated(")");
    }
    if !filters.tags.is_empty() {
        builder.push(" AND EXISTS (SELECT 1 FROM document_tags t WHERE t.path = d.path AND t.tag IN (");
        let mut values = builder.separated(", ");
        for tag in &filters.tags {
            values.push_bind(tag.clone());
        }
        values.push_unseparated("))");
    }
}

/// Turns full-text syntax errors into an explanation the user can act on.
/// The engine's own message only goes to the log.
fn translate_engine_error(compiled: &CompiledSearch, err: sqlx::Error) -> VaultError {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        if message.contains("fts5")
            || message.contains("syntax error")
            || message.contains("unterminated string")
            || message.contains("no such column")
        {
            debug!(
                query = %compiled.query,
                fts = %compiled.match_expression,
                "search engine rejected query: {message}"
            );
            let hint = if has_negation_only_branch(&compiled.match_expression) {
                "a negated term needs at least one positive term in the same branch, \
                 as in `notes -draft`"
            } else {
                "`*` may only end a word and punctuation inside a word must be quoted"
            };
            return VaultError::InvalidSearch {
                query: compiled.query.clone(),
                hint: hint.to_string(),
            };
        }
    }
    err.into()
}

/// Whether the expression, or one of its OR branches, starts with `NOT`.
fn has_negation_only_branch(match_expression: &str) -> bool {
    match_expression.starts_with("NOT ")
        || match_expression.contains(" OR NOT ")
        || match_expression.contains("(NOT ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_search() {
        let compiled = compile_search("project:work tag:#Urgent in:title API").expect("compile");
        assert_eq!(compiled.match_expression, "title:API");
        assert_eq!(compiled.filters.projects, vec!["work".to_string()]);
        assert_eq!(compiled.filters.tags, vec!["urgent".to_string()]);
        assert!(!compiled.matches_everything());
    }

    #[test]
    fn test_filter_only_query_matches_everything() {
        let compiled = compile_search("project:work").expect("compile");
        assert!(compiled.matches_everything());
    }

    #[test]
    fn test_negation_only_branches() {
        let fts = |query: &str| compile_search(query).expect("compile").match_expression;
        assert!(has_negation_only_branch(&fts("-draft")));
        assert!(has_negation_only_branch(&fts("tag:x -draft")));
        assert!(has_negation_only_branch(&fts("alpha OR -draft")));
        assert!(!has_negation_only_branch(&fts("notes -draft")));
        assert!(!has_negation_only_branch(&fts("\"NOT\" alpha")));
    }

    #[test]
    fn test_syntax_errors_surface() {
        let err = compile_search("\"open").expect_err("should fail");
        assert!(matches!(err, VaultError::Syntax(_)));
    }
}
