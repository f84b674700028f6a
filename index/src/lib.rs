//! Document index for a vault of JSON notes.
//!
//! Documents live under project directories in the vault root. This crate
//! keeps a SQLite index (relational records plus an FTS5 table) consistent
//! with those files: the [`Indexer`] applies per-document updates atomically,
//! the [`VaultWatcher`] turns debounced filesystem events into updates, and
//! the [`DocumentWriter`] saves files and indexes them under a per-path lock.
//! [`SearchService`] runs search-language queries against the result.

pub mod config;
pub mod document;
pub mod error;
pub mod indexer;
pub mod layout;
pub mod search;
pub mod serializer;
pub mod store;
pub mod watcher;
pub mod writer;

pub use config::VaultConfig;
pub use document::Block;
pub use document::Document;
pub use document::DocumentProjection;
pub use document::Inline;
pub use error::Result;
pub use error::VaultError;
pub use indexer::IndexPhase;
pub use indexer::IndexProgress;
pub use indexer::Indexer;
pub use indexer::ProgressCallback;
pub use indexer::ScanFailure;
pub use indexer::ScanReport;
pub use layout::VaultLayout;
pub use layout::VaultPath;
pub use search::CompiledSearch;
pub use search::SearchHit;
pub use search::SearchOptions;
pub use search::SearchService;
pub use serializer::PathGuard;
pub use serializer::PathLocks;
pub use store::DocumentRecord;
pub use store::IndexStore;
pub use store::StoreStats;
pub use watcher::DocumentSink;
pub use watcher::VaultWatcher;
pub use watcher::WatchOp;
pub use writer::DocumentWriter;

use std::sync::Arc;
use tracing::info;

/// Everything needed to index, watch and search one vault, sharing a store
/// and a set of path locks.
#[derive(Clone)]
pub struct VaultContext {
    config: VaultConfig,
    store: IndexStore,
    indexer: Indexer,
    writer: DocumentWriter,
    search: SearchService,
}

impl VaultContext {
    pub async fn open(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let store = IndexStore::open_with(&config.database_path, config.max_connections).await?;
        let indexer = Indexer::new(
            store.clone(),
            config.layout(),
            PathLocks::new(),
            config.max_concurrent,
        );
        let writer = DocumentWriter::new(indexer.clone());
        let search = SearchService::new(store.clone(), config.search_limit);
        info!(
            vault = %config.vault_root.display(),
            database = %config.database_path.display(),
            "opened vault index"
        );
        Ok(Self {
            config,
            store,
            indexer,
            writer,
            search,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn writer(&self) -> &DocumentWriter {
        &self.writer
    }

    pub fn search(&self) -> &SearchService {
        &self.search
    }

    /// A watcher feeding this context's indexer; not yet started.
    pub fn watcher(&self) -> VaultWatcher {
        VaultWatcher::new(
            self.config.layout(),
            Arc::new(self.indexer.clone()),
            self.config.debounce(),
        )
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
