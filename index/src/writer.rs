use crate::document::Document;
use crate::document::write_atomic;
use crate::document::write_document;
use crate::error::Result;
use crate::error::VaultError;
use crate::indexer::Indexer;
use crate::layout::VaultPath;
use crate::store::DocumentRecord;
use std::path::Path;
use tracing::debug;

/// Application-side writes that keep the index in step with the files.
///
/// Each operation holds the owning document's path lock from the file write
/// until the index update commits, so concurrent saves of one document
/// finish one after another and the index always matches the last write.
#[derive(Clone)]
pub struct DocumentWriter {
    indexer: Indexer,
}

impl DocumentWriter {
    pub fn new(indexer: Indexer) -> Self {
        Self { indexer }
    }

    /// Writes `document` to `path` and indexes it.
    pub async fn save_document(&self, path: &Path, document: &Document) -> Result<DocumentRecord> {
        let rel = self.indexer.document_rel(path)?;
        let guard = self.indexer.locks().lock(rel).await;
        let absolute = self.indexer.layout().absolute(guard.key());
        write_document(&absolute, document).await?;
        debug!(path = guard.key(), "saved document");
        self.indexer.index_locked(&guard).await
    }

    /// Stores an uploaded asset under the project's assets directory and
    /// registers it, holding `document`'s lock so a save of that document
    /// queued behind the upload sees the registration. The asset's own lock
    /// keeps a concurrent scan from pruning it mid-upload.
    ///
    /// Returns the asset's vault-relative path.
    pub async fn save_asset(&self, document: &Path, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        if file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\'])
        {
            return Err(VaultError::InvalidPath(format!(
                "invalid asset file name {file_name:?}"
            )));
        }
        let rel = self.indexer.document_rel(document)?;
        let layout = self.indexer.layout();
        let VaultPath::Document { project_dir, .. } = layout.classify_rel(&rel) else {
            return Err(VaultError::NotADocument(rel));
        };
        let asset_rel = format!("{project_dir}/{}/{file_name}", layout.assets_dir());

        let _document_guard = self.indexer.locks().lock(rel).await;
        let asset_guard = self.indexer.locks().lock(asset_rel.as_str()).await;
        write_atomic(&layout.absolute(&asset_rel), bytes).await?;
        self.indexer.register_asset_locked(&asset_guard).await?;
        debug!(path = %asset_rel, "saved asset");
        Ok(asset_rel)
    }

    /// Deletes the document file and its index records.
    pub async fn delete_document(&self, path: &Path) -> Result<bool> {
        let rel = self.indexer.document_rel(path)?;
        let guard = self.indexer.locks().lock(rel).await;
        let absolute = self.indexer.layout().absolute(guard.key());
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.indexer.remove_completely_locked(&guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Block;
    use crate::layout::VaultLayout;
    use crate::serializer::PathLocks;
    use crate::store::IndexStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, DocumentWriter) {
        let dir = TempDir::new().expect("tempdir");
        let store = IndexStore::open(&dir.path().join("index.db"))
            .await
            .expect("store");
        let layout = VaultLayout::with_defaults(&dir.path().join("vault"));
        let indexer = Indexer::new(store, layout, PathLocks::new(), 2);
        (dir, DocumentWriter::new(indexer))
    }

    #[tokio::test]
    async fn test_save_asset_then_reference_it() {
        let (_dir, writer) = setup().await;
        let doc = Path::new("@work/report.json");

        let asset = writer
            .save_asset(doc, "chart.png", b"png".to_vec())
            .await
            .expect("save asset");
        assert_eq!(asset, "@work/assets/chart.png");

        let document = Document {
            title: Some("Report".to_string()),
            tags: Vec::new(),
            blocks: vec![Block::Image {
                url: "assets/chart.png".to_string(),
                caption: None,
            }],
        };
        writer.save_document(doc, &document).await.expect("save");

        let store = writer.indexer.store();
        assert_eq!(
            store.asset_refs_for("@work/report.json").await.expect("refs"),
            vec![asset]
        );
    }

    #[tokio::test]
    async fn test_save_asset_rejects_bad_names() {
        let (_dir, writer) = setup().await;
        let doc = Path::new("@work/report.json");
        for name in ["", "../x.png", ".secret", "a/b.png"] {
            assert!(writer.save_asset(doc, name, Vec::new()).await.is_err(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_delete_document_removes_file_and_records() {
        let (_dir, writer) = setup().await;
        let doc = Path::new("@work/a.json");
        writer
            .save_document(doc, &Document::default())
            .await
            .expect("save");

        assert!(writer.delete_document(doc).await.expect("delete"));
        assert!(!writer.indexer.layout().absolute("@work/a.json").exists());
        assert!(
            writer
                .indexer
                .store()
                .get_document("@work/a.json")
                .await
                .expect("get")
                .is_none()
        );
        assert!(!writer.delete_document(doc).await.expect("delete again"));
    }
}
