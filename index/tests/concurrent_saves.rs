use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use vault_index::Block;
use vault_index::Document;
use vault_index::SearchOptions;
use vault_index::VaultConfig;
use vault_index::VaultContext;
use vault_index::VaultError;
use vault_index::document::read_document;

async fn open_vault() -> (TempDir, std::path::PathBuf, VaultContext) {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path().join("vault");
    let mut config = VaultConfig::for_vault(&root);
    config.database_path = dir.path().join("index.db");
    let context = VaultContext::open(config).await.expect("open");
    (dir, root, context)
}

fn illustrated(title: &str, asset: &str) -> Document {
    Document {
        title: Some(title.to_string()),
        tags: Vec::new(),
        blocks: vec![Block::Image {
            url: asset.to_string(),
            caption: None,
        }],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_of_one_document_leave_one_consistent_version() {
    let (_dir, root, context) = open_vault().await;

    let mut tasks = Vec::new();
    for i in 0..50 {
        let writer = context.writer().clone();
        tasks.push(tokio::spawn(async move {
            let document = Document {
                title: Some(format!("version{i}")),
                tags: vec![format!("t{i}")],
                blocks: vec![Block::paragraph(format!("shared body revision{i}"))],
            };
            writer
                .save_document(Path::new("@work/shared.json"), &document)
                .await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("save");
    }

    let on_disk = read_document(&root.join("@work/shared.json"))
        .await
        .expect("read");
    let title = on_disk.title.clone().expect("title");
    let revision = title.trim_start_matches("version");

    let record = context
        .store()
        .get_document("@work/shared.json")
        .await
        .expect("get")
        .expect("record");
    assert_eq!(record.title, title);
    assert_eq!(
        context.store().tags_for("@work/shared.json").await.expect("tags"),
        vec![format!("t{revision}")]
    );
    assert_eq!(context.store().fts_entry_count("@work/shared.json").await.expect("count"), 1);

    let hits = context
        .search()
        .search("shared", SearchOptions::default())
        .await
        .expect("search");
    assert_eq!(hits.len(), 1);
    let matching = context
        .search()
        .search(&format!("revision{revision}"), SearchOptions::default())
        .await
        .expect("search");
    assert_eq!(matching.len(), 1);
    assert_eq!(context.indexer().locks().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scans_do_not_prune_assets_uploaded_during_the_scan() {
    let (_dir, _root, context) = open_vault().await;
    context
        .writer()
        .save_asset(Path::new("@work/doc.json"), "seed.png", b"png".to_vec())
        .await
        .expect("seed asset");

    let indexer = context.indexer().clone();
    let scans = tokio::spawn(async move {
        for _ in 0..40 {
            indexer.scan_and_index_vault(None).await.expect("scan");
        }
    });
    let writer = context.writer().clone();
    let uploads = tokio::spawn(async move {
        let mut uploaded = Vec::new();
        for i in 0..40 {
            let asset = writer
                .save_asset(Path::new("@work/doc.json"), &format!("up{i}.png"), b"png".to_vec())
                .await
                .expect("upload");
            uploaded.push(asset);
            tokio::task::yield_now().await;
        }
        uploaded
    });
    scans.await.expect("join scans");
    let uploaded = uploads.await.expect("join uploads");

    let registered = context.store().asset_paths().await.expect("assets");
    for asset in &uploaded {
        assert!(registered.contains(asset), "{asset} lost its registration");
    }
    assert_eq!(context.indexer().locks().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_and_saves_record_every_reference() {
    let (_dir, _root, context) = open_vault().await;

    let mut tasks = Vec::new();
    for i in 0..30 {
        let writer = context.writer().clone();
        tasks.push(tokio::spawn(async move {
            let doc = format!("@work/note{}.json", i % 10);
            let asset = writer
                .save_asset(Path::new(&doc), &format!("img{i}.png"), b"png".to_vec())
                .await?;
            writer
                .save_document(
                    Path::new(&doc),
                    &illustrated(&format!("note {i}"), &format!("assets/img{i}.png")),
                )
                .await?;
            Ok::<_, VaultError>((doc, asset))
        }));
    }
    let indexer = context.indexer().clone();
    let scan = tokio::spawn(async move { indexer.scan_and_index_vault(None).await });

    let mut saved = Vec::new();
    for task in tasks {
        match task.await.expect("join") {
            Ok(pair) => saved.push(pair),
            Err(VaultError::Integrity(message)) => panic!("integrity violation: {message}"),
            Err(err) => panic!("save failed: {err}"),
        }
    }
    scan.await.expect("join scan").expect("scan");

    let registered = context.store().asset_paths().await.expect("assets");
    assert_eq!(registered.len(), 30);
    for i in 0..10 {
        let doc = format!("@work/note{i}.json");
        let on_disk = read_document(&context.indexer().layout().absolute(&doc))
            .await
            .expect("read");
        let Some(Block::Image { url, .. }) = on_disk.blocks.first() else {
            panic!("{doc} has no image block");
        };
        let expected = format!("@work/{url}");
        assert!(saved.iter().any(|(_, asset)| asset == &expected));
        assert_eq!(
            context.store().asset_refs_for(&doc).await.expect("refs"),
            vec![expected]
        );
    }
}
