mod common;

use static_export::application::export::ExportReport;
use static_export::application::manager::{PublishOutcome, StaticExportManager};
use static_export::domain::entities::{ExportLink, PublishedEntry};
use static_export::domain::types::ChangeState;
use static_export::infra::memory::MemoryBackend;
use uuid::Uuid;

use common::{files_below, manager, read, settings, tempdir};

async fn publish(
    manager: &StaticExportManager,
    backend: &MemoryBackend,
    root_path: &str,
    state: ChangeState,
) -> (usize, ExportReport) {
    let record = backend.tree.record(root_path).expect("resource exists");
    let entries = vec![PublishedEntry::from_resource(&record, state)];
    let outcome = manager
        .on_publish(Uuid::new_v4(), entries)
        .expect("export enabled")
        .await
        .expect("join");
    match outcome {
        PublishOutcome::Completed {
            purged_files,
            export: Some(report),
            ..
        } => (purged_files, report),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn publishing_an_article_rerenders_the_pages_embedding_it() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let article = backend.tree.insert_file(
        "/sites/default/.content/a1.xml",
        "xmlcontent",
        "<article/>",
    );
    let home = backend
        .tree
        .insert_file("/sites/default/home.html", "containerpage", "home");
    backend
        .relations
        .add_content_referrer(article.structure_id, home);
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export = dir.path().join("export");

    let report = manager.run_full_export(false).await.expect("export runs");
    assert!(report.is_clean(), "{report:?}");
    let exported = vec![".content/a1.xml.html".to_string(), "home.html".to_string()];
    assert_eq!(files_below(&export), exported);

    let (purged, report) = publish(
        &manager,
        &backend,
        "/sites/default/.content/a1.xml",
        ChangeState::Changed,
    )
    .await;

    assert_eq!(purged, 2);
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.exported, 2);
    assert_eq!(files_below(&export), exported);
    assert_eq!(
        read(export.join("home.html")),
        "<!-- /sites/default/home.html -->\nhome"
    );
}

#[tokio::test]
async fn links_found_while_rendering_join_the_batch_once() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "<h1>Home</h1>");
    backend
        .tree
        .insert_file("/sites/default/news/article.html", "jsp", "<p>Article</p>");
    backend.renderer.add_link(
        "/sites/default/index.html",
        ExportLink::new("/sites/default/news/article.html"),
    );
    backend.renderer.add_link(
        "/sites/default/index.html",
        ExportLink::new("/sites/default/news/article.html").with_parameters("page=2"),
    );
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export = dir.path().join("export");

    let (_, report) = publish(
        &manager,
        &backend,
        "/sites/default/index.html",
        ChangeState::New,
    )
    .await;
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.exported, 3);
    assert_eq!(backend.renderer.render_count(), 3);
    assert_eq!(
        files_below(&export),
        vec![
            "index.html".to_string(),
            "news/article.html".to_string(),
            "news/article_1.html".to_string(),
        ]
    );

    let (purged, report) = publish(
        &manager,
        &backend,
        "/sites/default/index.html",
        ChangeState::Changed,
    )
    .await;
    assert_eq!(purged, 1);
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(
        backend.renderer.render_count(),
        5,
        "recorded parameter links are not rendered again"
    );
    assert_eq!(
        files_below(&export),
        vec![
            "index.html".to_string(),
            "news/article.html".to_string(),
            "news/article_1.html".to_string(),
        ]
    );
}
