use crate::document::DocumentProjection;
use crate::document::read_document;
use crate::error::Result;
use crate::error::VaultError;
use crate::layout::VaultLayout;
use crate::layout::VaultPath;
use crate::serializer::PathGuard;
use crate::serializer::PathLocks;
use crate::store;
use crate::store::DocumentRecord;
use crate::store::FtsEntry;
use crate::store::IndexStore;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing::info;
use tracing::warn;
use walkdir::WalkDir;

/// Progress callback for indexing operations
pub type ProgressCallback = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Indexing progress information
#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Clearing,
    Discovering,
    Indexing,
    Pruning,
    Complete,
}

/// A file the scan could not index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of a vault scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub projects: usize,
    pub documents_found: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub pruned: usize,
    pub assets_registered: usize,
    pub assets_pruned: usize,
    pub failures: Vec<ScanFailure>,
}

/// Keeps the index consistent with document files.
///
/// Every public operation on a document takes that document's path lock, so
/// the scan, the watcher and the writer never interleave on one path.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

struct IndexerInner {
    store: IndexStore,
    layout: VaultLayout,
    locks: PathLocks,
    max_concurrent: usize,
}

#[derive(Default)]
struct Discovery {
    projects: Vec<(String, String)>,
    documents: Vec<DiscoveredFile>,
    assets: Vec<DiscoveredAsset>,
    failures: Vec<ScanFailure>,
}

struct DiscoveredFile {
    rel: String,
    size: i64,
    modified_at: i64,
}

struct DiscoveredAsset {
    rel: String,
    project_alias: String,
    size: i64,
}

impl Indexer {
    pub fn new(
        store: IndexStore,
        layout: VaultLayout,
        locks: PathLocks,
        max_concurrent: usize,
    ) -> Self {
        Self {
            inner: Arc::new(IndexerInner {
                store,
                layout,
                locks,
                max_concurrent: max_concurrent.max(1),
            }),
        }
    }

    pub fn store(&self) -> &IndexStore {
        &self.inner.store
    }

    pub fn layout(&self) -> &VaultLayout {
        &self.inner.layout
    }

    pub fn locks(&self) -> &PathLocks {
        &self.inner.locks
    }

    /// Vault-relative path of a document, rejecting anything else.
    pub fn document_rel(&self, path: &Path) -> Result<String> {
        let rel = self.inner.layout.relative(path)?;
        match self.inner.layout.classify_rel(&rel) {
            VaultPath::Document { .. } => Ok(rel),
            _ => Err(VaultError::NotADocument(rel)),
        }
    }

    /// Reads the document at `path` and replaces everything the index holds
    /// for it in one transaction.
    pub async fn index_document(&self, path: &Path) -> Result<DocumentRecord> {
        let rel = self.document_rel(path)?;
        let guard = self.inner.locks.lock(rel).await;
        self.index_locked(&guard).await
    }

    /// Same as [`Indexer::index_document`]; used when a known document changed.
    pub async fn reindex_document(&self, path: &Path) -> Result<DocumentRecord> {
        self.index_document(path).await
    }

    /// Hides a document from search but keeps its record, marked deleted.
    pub async fn remove_document(&self, path: &Path) -> Result<bool> {
        let rel = self.document_rel(path)?;
        let guard = self.inner.locks.lock(rel).await;
        let rel = guard.key();

        let mut tx = self.inner.store.begin().await?;
        store::delete_fts_entry(&mut tx, rel).await?;
        let marked = store::mark_deleted(&mut tx, rel, now_millis()).await?;
        tx.commit().await?;

        debug!(path = rel, marked, "removed document from search");
        Ok(marked)
    }

    /// Deletes the full-text entry and the record with everything derived
    /// from it. Returns whether a record existed.
    pub async fn remove_document_completely(&self, path: &Path) -> Result<bool> {
        let rel = self.document_rel(path)?;
        let guard = self.inner.locks.lock(rel).await;
        self.remove_completely_locked(&guard).await
    }

    /// Deletes every full-text entry, document, asset and project.
    pub async fn clear_index(&self) -> Result<()> {
        let mut tx = self.inner.store.begin().await?;
        store::clear_fts(&mut tx).await?;
        let documents = store::delete_all_documents(&mut tx).await?;
        let projects = store::delete_all_projects(&mut tx).await?;
        tx.commit().await?;
        info!(documents, projects, "cleared index");
        Ok(())
    }

    /// Clears the index and scans the whole vault again.
    pub async fn rebuild(&self, progress: Option<ProgressCallback>) -> Result<ScanReport> {
        report_progress(&progress, IndexPhase::Clearing, 0, 0, None);
        self.clear_index().await?;
        self.scan_and_index_vault(progress).await
    }

    /// Brings the index in line with the vault on disk.
    ///
    /// New and changed documents are indexed, records whose files are gone
    /// are pruned. Failures on single files are collected in the report.
    pub async fn scan_and_index_vault(
        &self,
        progress: Option<ProgressCallback>,
    ) -> Result<ScanReport> {
        let root = self.inner.layout.root().to_path_buf();
        let mut report = ScanReport::default();
        if !tokio::fs::try_exists(&root).await? {
            info!(root = %root.display(), "vault root does not exist; nothing to scan");
            report_progress(&progress, IndexPhase::Complete, 0, 0, None);
            return Ok(report);
        }

        info!(root = %root.display(), "scanning vault");
        report_progress(&progress, IndexPhase::Discovering, 0, 0, None);
        let layout = self.inner.layout.clone();
        let discovery = tokio::task::spawn_blocking(move || discover(&layout)).await?;
        report.projects = discovery.projects.len();
        report.documents_found = discovery.documents.len();
        report.failures = discovery.failures;
        info!(
            projects = discovery.projects.len(),
            documents = discovery.documents.len(),
            assets = discovery.assets.len(),
            "discovered vault contents"
        );

        let (registered, pruned) = self
            .sync_projects_and_assets(&discovery.projects, &discovery.assets)
            .await?;
        report.assets_registered = registered;
        report.assets_pruned = pruned;

        let stamps = self.inner.store.document_stamps().await?;
        let mut changed = Vec::new();
        for file in &discovery.documents {
            match stamps.get(&file.rel) {
                Some(stamp) if stamp.size == file.size && stamp.modified_at == file.modified_at => {
                    report.unchanged += 1;
                }
                _ => changed.push(file.rel.clone()),
            }
        }
        debug!(
            changed = changed.len(),
            unchanged = report.unchanged,
            "determined stale documents"
        );

        let (indexed, failures) = self.index_batch(changed, &progress).await;
        report.indexed = indexed;
        report.failures.extend(failures);

        let on_disk: HashSet<&str> = discovery
            .documents
            .iter()
            .map(|file| file.rel.as_str())
            .collect();
        let gone: Vec<&String> = stamps
            .keys()
            .filter(|rel| !on_disk.contains(rel.as_str()))
            .collect();
        let total = gone.len();
        for (idx, rel) in gone.into_iter().enumerate() {
            report_progress(
                &progress,
                IndexPhase::Pruning,
                idx + 1,
                total,
                Some(rel.clone()),
            );
            let guard = self.inner.locks.lock(rel.as_str()).await;
            // The writer may have recreated the file while we waited.
            if tokio::fs::try_exists(self.inner.layout.absolute(rel)).await? {
                continue;
            }
            match self.remove_completely_locked(&guard).await {
                Ok(true) => report.pruned += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %rel, "failed to prune document: {err}");
                    report.failures.push(ScanFailure {
                        path: rel.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        report_progress(
            &progress,
            IndexPhase::Complete,
            report.documents_found,
            report.documents_found,
            None,
        );
        info!(
            indexed = report.indexed,
            unchanged = report.unchanged,
            pruned = report.pruned,
            failed = report.failures.len(),
            "vault scan complete"
        );
        Ok(report)
    }

    /// Registers an asset file so documents saved afterwards can reference
    /// it.
    pub async fn register_asset(&self, path: &Path) -> Result<()> {
        let rel = self.inner.layout.relative(path)?;
        let guard = self.inner.locks.lock(rel).await;
        self.register_asset_locked(&guard).await
    }

    /// Registers the asset named by `guard`, whose path lock the caller
    /// holds.
    pub(crate) async fn register_asset_locked(&self, guard: &PathGuard) -> Result<()> {
        let rel = guard.key();
        let VaultPath::Asset {
            project_alias,
            project_dir,
            ..
        } = self.inner.layout.classify_rel(rel)
        else {
            return Err(VaultError::InvalidPath(format!("{rel} is not an asset path")));
        };
        let size = file_size(&tokio::fs::metadata(self.inner.layout.absolute(rel)).await?);
        let now = now_millis();

        let mut tx = self.inner.store.begin().await?;
        store::upsert_project(&mut tx, &project_alias, &project_dir, now).await?;
        store::register_asset(&mut tx, rel, &project_alias, size, now).await?;
        tx.commit().await?;
        debug!(path = rel, "registered asset");
        Ok(())
    }

    pub(crate) async fn index_locked(&self, guard: &PathGuard) -> Result<DocumentRecord> {
        let rel = guard.key();
        let layout = &self.inner.layout;
        let VaultPath::Document {
            project_alias,
            project_dir,
            ..
        } = layout.classify_rel(rel)
        else {
            return Err(VaultError::NotADocument(rel.to_string()));
        };

        let path = layout.absolute(rel);
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(VaultError::NotADocument(rel.to_string()));
        }
        let document = read_document(&path).await?;

        let file_stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let projection = DocumentProjection::from_document(&document, &file_stem);
        let mut asset_refs: Vec<String> = Vec::new();
        for reference in &projection.references {
            if let Some(asset) = layout.resolve_asset_reference(rel, reference)
                && !asset_refs.contains(&asset)
            {
                asset_refs.push(asset);
            }
        }

        let now = now_millis();
        let record = DocumentRecord {
            path: rel.to_string(),
            project_alias: project_alias.clone(),
            title: projection.title.clone(),
            has_code: projection.has_code,
            has_links: projection.has_links,
            size: file_size(&metadata),
            modified_at: metadata.modified().map(system_time_millis).unwrap_or(now),
            indexed_at: now,
            deleted_at: None,
        };
        let entry = FtsEntry {
            path: rel.to_string(),
            title: projection.title,
            headings: projection.headings,
            body: projection.body,
            code: projection.code,
        };

        let mut tx = self.inner.store.begin().await?;
        store::upsert_project(&mut tx, &project_alias, &project_dir, now).await?;
        store::upsert_document(&mut tx, &record).await?;
        store::replace_fts_entry(&mut tx, &entry).await?;
        store::replace_tags(&mut tx, rel, &projection.tags).await?;
        store::replace_links(&mut tx, rel, &projection.links).await?;
        store::replace_asset_refs(&mut tx, rel, &asset_refs).await?;
        tx.commit().await?;

        debug!(
            path = rel,
            tags = projection.tags.len(),
            links = projection.links.len(),
            assets = asset_refs.len(),
            "indexed document"
        );
        Ok(record)
    }

    pub(crate) async fn remove_completely_locked(&self, guard: &PathGuard) -> Result<bool> {
        let rel = guard.key();
        let mut tx = self.inner.store.begin().await?;
        store::delete_fts_entry(&mut tx, rel).await?;
        let existed = store::delete_document(&mut tx, rel).await?;
        tx.commit().await?;
        debug!(path = rel, existed, "removed document from index");
        Ok(existed)
    }

    async fn sync_projects_and_assets(
        &self,
        projects: &[(String, String)],
        assets: &[DiscoveredAsset],
    ) -> Result<(usize, usize)> {
        let known = self.inner.store.asset_paths().await?;
        let on_disk: HashSet<&str> = assets.iter().map(|asset| asset.rel.as_str()).collect();
        let now = now_millis();

        let mut tx = self.inner.store.begin().await?;
        for (alias, dir_name) in projects {
            store::upsert_project(&mut tx, alias, dir_name, now).await?;
        }
        for asset in assets {
            store::register_asset(&mut tx, &asset.rel, &asset.project_alias, asset.size, now)
                .await?;
        }
        tx.commit().await?;

        let mut pruned = 0;
        for rel in known.iter().filter(|rel| !on_disk.contains(rel.as_str())) {
            let _guard = self.inner.locks.lock(rel.as_str()).await;
            // Uploaded after discovery walked its directory.
            if tokio::fs::try_exists(self.inner.layout.absolute(rel)).await? {
                continue;
            }
            let mut tx = self.inner.store.begin().await?;
            if store::remove_asset(&mut tx, rel).await? {
                pruned += 1;
            }
            tx.commit().await?;
        }
        Ok((assets.len(), pruned))
    }

    /// Indexes `paths` concurrently, bounded by `max_concurrent`.
    async fn index_batch(
        &self,
        paths: Vec<String>,
        progress: &Option<ProgressCallback>,
    ) -> (usize, Vec<ScanFailure>) {
        let total = paths.len();
        let semaphore = Arc::new(Semaphore::new(self.inner.max_concurrent));
        let done = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::with_capacity(total);
        for rel in paths {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let done = Arc::clone(&done);
            let progress = progress.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let guard = this.inner.locks.lock(rel.as_str()).await;
                let result = this.index_locked(&guard).await;
                drop(guard);
                let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                report_progress(
                    &progress,
                    IndexPhase::Indexing,
                    current,
                    total,
                    Some(rel.clone()),
                );
                (rel, result)
            }));
        }

        let mut indexed = 0;
        let mut failures = Vec::new();
        for task in tasks {
            match task.await {
                Ok((_, Ok(_))) => indexed += 1,
                Ok((rel, Err(err))) => {
                    warn!(path = %rel, "failed to index document: {err}");
                    failures.push(ScanFailure {
                        path: rel,
                        error: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!("index task failed: {err}");
                    failures.push(ScanFailure {
                        path: String::new(),
                        error: err.to_string(),
                    });
                }
            }
        }
        (indexed, failures)
    }
}

fn discover(layout: &VaultLayout) -> Discovery {
    let mut discovery = Discovery::default();
    let walker = WalkDir::new(layout.root())
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                return false;
            }
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && layout.project_alias(&name).is_none())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default();
                warn!(path = %path, "failed to walk vault entry: {err}");
                discovery.failures.push(ScanFailure {
                    path,
                    error: err.to_string(),
                });
                continue;
            }
        };
        let Ok(rel) = layout.relative(entry.path()) else {
            continue;
        };
        let file_type = entry.file_type();
        match layout.classify_rel(&rel) {
            VaultPath::ProjectDir {
                project_alias,
                dir_name,
            } if file_type.is_dir() => discovery.projects.push((project_alias, dir_name)),
            VaultPath::Document { .. } if file_type.is_file() => match entry.metadata() {
                Ok(metadata) => discovery.documents.push(DiscoveredFile {
                    size: file_size(&metadata),
                    modified_at: metadata
                        .modified()
                        .map(system_time_millis)
                        .unwrap_or_default(),
                    rel,
                }),
                Err(err) => discovery.failures.push(ScanFailure {
                    path: rel,
                    error: err.to_string(),
                }),
            },
            VaultPath::Asset { project_alias, .. } if file_type.is_file() => {
                let size = entry.metadata().map(|m| file_size(&m)).unwrap_or_default();
                discovery.assets.push(DiscoveredAsset {
                    rel,
                    project_alias,
                    size,
                });
            }
            _ => {}
        }
    }
    discovery
}

fn report_progress(
    callback: &Option<ProgressCallback>,
    phase: IndexPhase,
    current: usize,
    total: usize,
    current_file: Option<String>,
) {
    if let Some(cb) = callback {
        cb(IndexProgress {
            phase,
            current,
            total,
            current_file,
        });
    }
}

fn file_size(metadata: &std::fs::Metadata) -> i64 {
    i64::try_from(metadata.len()).unwrap_or(i64::MAX)
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    datetime_millis(OffsetDateTime::now_utc())
}

pub(crate) fn system_time_millis(time: SystemTime) -> i64 {
    datetime_millis(OffsetDateTime::from(time))
}

fn datetime_millis(datetime: OffsetDateTime) -> i64 {
    i64::try_from(datetime.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Indexer) {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("vault");
        std::fs::create_dir_all(&root).expect("vault root");
        let store = IndexStore::open(&dir.path().join("index.db"))
            .await
            .expect("store");
        let indexer = Indexer::new(
            store,
            VaultLayout::with_defaults(&root),
            PathLocks::new(),
            4,
        );
        (dir, indexer)
    }

    fn write(indexer: &Indexer, rel: &str, json: &str) {
        let path = indexer.layout().absolute(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, json).expect("write");
    }

    #[test]
    fn test_millis_conversion() {
        let time = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_234);
        assert_eq!(system_time_millis(time), 1_234);
    }

    #[tokio::test]
    async fn test_rejects_non_documents() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "plain/a.json", "{}");
        let err = indexer
            .index_document(Path::new("plain/a.json"))
            .await
            .expect_err("no project prefix");
        assert!(matches!(err, VaultError::NotADocument(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let (_dir, indexer) = setup().await;
        write(
            &indexer,
            "@work/a.json",
            r#"{"blocks":[{"type":"paragraph","content":[{"type":"text","text":"kestrel"}]}]}"#,
        );
        let path = Path::new("@work/a.json");
        indexer.index_document(path).await.expect("index");

        assert!(indexer.remove_document(path).await.expect("remove"));
        let record = indexer
            .store()
            .get_document("@work/a.json")
            .await
            .expect("get")
            .expect("record kept");
        assert!(record.is_deleted());
        assert_eq!(indexer.store().fts_entry_count("@work/a.json").await.expect("count"), 0);

        indexer.reindex_document(path).await.expect("reindex");
        let record = indexer
            .store()
            .get_document("@work/a.json")
            .await
            .expect("get")
            .expect("record");
        assert!(!record.is_deleted());
        assert_eq!(indexer.store().fts_entry_count("@work/a.json").await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_scan_reports_phases_and_failures() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "@work/good.json", r#"{"title":"Good"}"#);
        write(&indexer, "@work/bad.json", "{ nope");
        write(&indexer, "loose/ignored.json", r#"{"title":"Ignored"}"#);
        write(&indexer, "@work/.hidden/x.json", r#"{"title":"Hidden"}"#);

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let progress: ProgressCallback = Arc::new(move |p: IndexProgress| {
            if let Ok(mut phases) = sink.lock()
                && phases.last() != Some(&p.phase)
            {
                phases.push(p.phase);
            }
        });

        let report = indexer
            .rebuild(Some(progress))
            .await
            .expect("rebuild");
        assert_eq!(report.documents_found, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "@work/bad.json");
        assert_eq!(
            phases.lock().expect("phases").clone(),
            vec![
                IndexPhase::Clearing,
                IndexPhase::Discovering,
                IndexPhase::Indexing,
                IndexPhase::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_skips_unchanged_and_prunes_missing() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "@work/a.json", r#"{"title":"A"}"#);
        write(&indexer, "@work/b.json", r#"{"title":"B"}"#);

        let first = indexer.scan_and_index_vault(None).await.expect("scan");
        assert_eq!(first.indexed, 2);

        std::fs::remove_file(indexer.layout().absolute("@work/b.json")).expect("remove");
        let second = indexer.scan_and_index_vault(None).await.expect("scan");
        assert_eq!(second.indexed, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.pruned, 1);
        assert!(
            indexer
                .store()
                .get_document("@work/b.json")
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_scan_keeps_unchanged_soft_deleted_documents_deleted() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "@work/a.json", r#"{"title":"A"}"#);
        indexer.scan_and_index_vault(None).await.expect("scan");
        indexer
            .remove_document(Path::new("@work/a.json"))
            .await
            .expect("remove");

        let report = indexer.scan_and_index_vault(None).await.expect("scan");
        assert_eq!(report.unchanged, 1);
        let record = indexer
            .store()
            .get_document("@work/a.json")
            .await
            .expect("get")
            .expect("record");
        assert!(record.is_deleted());
    }

    #[tokio::test]
    async fn test_asset_references_follow_registration() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "@work/assets/chart.png", "png");
        write(
            &indexer,
            "@work/report.json",
            r#"{"blocks":[
                {"type":"image","url":"assets/chart.png"},
                {"type":"image","url":"assets/missing.png"}
            ]}"#,
        );

        let report = indexer.scan_and_index_vault(None).await.expect("scan");
        assert_eq!(report.assets_registered, 1);
        assert_eq!(
            indexer
                .store()
                .asset_refs_for("@work/report.json")
                .await
                .expect("refs"),
            vec!["@work/assets/chart.png".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clear_index_removes_everything() {
        let (_dir, indexer) = setup().await;
        write(&indexer, "@work/a.json", r#"{"title":"A","tags":["x"]}"#);
        indexer.scan_and_index_vault(None).await.expect("scan");

        indexer.clear_index().await.expect("clear");
        let stats = indexer.store().stats().await.expect("stats");
        assert_eq!(stats, crate::store::StoreStats::default());
        assert_eq!(indexer.store().fts_entry_count("@work/a.json").await.expect("count"), 0);
    }
}
