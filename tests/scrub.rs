mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use static_export::application::manager::StaticExportManager;
use static_export::application::scrub::{OwnFileOnly, RenderedSubtree, ScrubEngine};
use static_export::domain::entities::PublishedEntry;
use static_export::domain::types::{ChangeState, LoaderKind, ResourceKind};
use static_export::infra::memory::{MemoryBackend, PLAIN_TYPE, TypeLoaderCatalog};

use common::{ctx, files_below, manager, settings, tempdir};

fn engine(manager: &StaticExportManager, backend: &MemoryBackend) -> ScrubEngine {
    ScrubEngine::new(
        Arc::clone(manager.translator()),
        backend.collaborators(),
        Arc::new(OwnFileOnly),
    )
}

async fn export_file(manager: &StaticExportManager, vfs_name: &str) -> PathBuf {
    manager
        .translator()
        .locate(&ctx(), vfs_name, None)
        .await
        .expect("translatable")
        .export_file
}

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().expect("has parent")).expect("create folders");
    std::fs::write(path, "exported").expect("write file");
}

fn changed(backend: &MemoryBackend, root_path: &str) -> PublishedEntry {
    let record = backend.tree.record(root_path).expect("resource exists");
    PublishedEntry::from_resource(&record, ChangeState::Changed)
}

#[tokio::test]
async fn changed_files_lose_their_export_and_parameter_variants() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/a.css", PLAIN_TYPE, "a");
    backend
        .tree
        .insert_file("/sites/default/keep.css", PLAIN_TYPE, "keep");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    let file = export_file(&manager, "/news/a.css").await;
    touch(&file);
    touch(&export_root.join("news/a_3.css"));
    touch(&export_root.join("keep.css"));

    let report = engine(&manager, &backend)
        .scrub(Some(vec![changed(&backend, "/sites/default/news/a.css")]))
        .await
        .expect("scrub runs");

    assert_eq!(report.purged_files, 2);
    assert_eq!(report.errors, 0);
    assert_eq!(files_below(&export_root), vec!["keep.css".to_string()]);
    assert!(!export_root.join("news").exists(), "empty folder removed");
    assert!(export_root.exists(), "export root is kept");
}

#[tokio::test]
async fn scrubbing_twice_leaves_the_same_tree() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "home");
    backend
        .tree
        .insert_file("/sites/default/other.css", PLAIN_TYPE, "other");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    touch(&export_file(&manager, "/index.html").await);
    touch(&export_file(&manager, "/other.css").await);
    let batch = vec![changed(&backend, "/sites/default/index.html")];
    let engine = engine(&manager, &backend);

    let first = engine.scrub(Some(batch.clone())).await.expect("scrub runs");
    let after_first = files_below(&export_root);
    let second = engine.scrub(Some(batch)).await.expect("scrub runs");

    assert_eq!(first.purged_files, 1);
    assert_eq!(second.purged_files, 0);
    assert_eq!(files_below(&export_root), after_first);
    assert_eq!(after_first, vec!["other.css".to_string()]);
}

#[tokio::test]
async fn pages_linking_to_a_moved_resource_are_purged() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let moved = backend
        .tree
        .insert_file("/sites/default/old.css", PLAIN_TYPE, "style");
    backend
        .tree
        .insert_file("/sites/default/page1.html", PLAIN_TYPE, "page one");
    backend
        .tree
        .insert_file("/sites/default/unrelated.html", PLAIN_TYPE, "unrelated");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    touch(&export_file(&manager, "/old.css").await);
    touch(&export_file(&manager, "/page1.html").await);
    touch(&export_file(&manager, "/unrelated.html").await);

    let destination = backend
        .tree
        .rename("/sites/default/old.css", "/sites/default/new.css")
        .expect("renamed");
    backend
        .relations
        .add_reference("/sites/default/page1.html", "/sites/default/new.css");

    let batch = vec![
        PublishedEntry::new(
            moved.structure_id,
            "/sites/default/old.css",
            ResourceKind::File,
            ChangeState::MovedSource,
        ),
        PublishedEntry::from_resource(&destination, ChangeState::MovedDestination),
    ];
    let report = engine(&manager, &backend)
        .scrub(Some(batch))
        .await
        .expect("scrub runs");

    assert_eq!(files_below(&export_root), vec!["unrelated.html".to_string()]);
    let page1 = report
        .entries
        .iter()
        .find(|entry| entry.root_path == "/sites/default/page1.html")
        .expect("referencing page joins the batch");
    assert_eq!(page1.state, ChangeState::Changed);
    assert_eq!(report.entries.len(), 3);
}

#[tokio::test]
async fn deleted_folders_take_their_exported_subtree_along() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/docs/sub/b.css", PLAIN_TYPE, "b");
    backend
        .tree
        .insert_file("/sites/default/keep.css", PLAIN_TYPE, "keep");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    touch(&export_root.join("docs/a.css"));
    touch(&export_root.join("docs/sub/b.css"));
    touch(&export_root.join("keep.css"));

    let folder = backend
        .tree
        .remove("/sites/default/docs/")
        .expect("folder existed");
    let entry = PublishedEntry::new(
        folder.structure_id,
        "/sites/default/docs/",
        ResourceKind::Folder,
        ChangeState::Deleted,
    );
    let report = engine(&manager, &backend)
        .scrub(Some(vec![entry]))
        .await
        .expect("scrub runs");

    assert_eq!(report.errors, 0);
    assert_eq!(files_below(&export_root), vec!["keep.css".to_string()]);
}

#[tokio::test]
async fn default_documents_also_purge_the_folder_copy() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/start.jsp", "jsp", "start");
    backend
        .tree
        .set_default_file("/sites/default/news/", "start.jsp")
        .expect("folder exists");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    touch(&export_root.join("news/index.html"));
    touch(&export_root.join("news/start.jsp.html"));
    touch(&export_root.join("news/other.css"));

    engine(&manager, &backend)
        .scrub(Some(vec![changed(&backend, "/sites/default/news/start.jsp")]))
        .await
        .expect("scrub runs");

    assert_eq!(files_below(&export_root), vec!["news/other.css".to_string()]);
}

#[tokio::test]
async fn content_changes_purge_detail_and_container_pages() {
    let dir = tempdir();
    let backend =
        MemoryBackend::new(TypeLoaderCatalog::default().with("article", LoaderKind::Template));
    let article = backend
        .tree
        .insert_file("/sites/default/.content/a1.xml", "article", "<article/>");
    backend
        .tree
        .insert_file("/sites/default/news/detail.jsp", "jsp", "detail");
    backend
        .details
        .add_detail_page("article", "/sites/default/news/detail.jsp");
    backend.details.add_url_name(&article, "first-article");

    let home = backend
        .tree
        .insert_file("/sites/default/home.html", "containerpage", "home");
    backend
        .relations
        .add_content_referrer(article.structure_id, home);
    let group = backend
        .tree
        .insert_file("/sites/default/.groups/g1.xml", "groupcontainer", "group");
    backend
        .relations
        .add_content_referrer(article.structure_id, group.clone());
    let page2 = backend
        .tree
        .insert_file("/sites/default/page2.html", "containerpage", "page two");
    backend
        .relations
        .add_content_referrer(group.structure_id, page2);
    backend
        .tree
        .insert_file("/sites/default/page3.html", "containerpage", "page three");

    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");
    touch(&export_root.join("news/first-article/index.html"));
    touch(&export_root.join("news/detail.jsp.html"));
    touch(&export_root.join("home.html"));
    touch(&export_root.join("page2.html"));
    touch(&export_root.join("page3.html"));

    let report = engine(&manager, &backend)
        .scrub(Some(vec![changed(&backend, "/sites/default/.content/a1.xml")]))
        .await
        .expect("scrub runs");

    assert_eq!(report.errors, 0);
    assert_eq!(
        files_below(&export_root),
        vec!["news/detail.jsp.html".to_string(), "page3.html".to_string()]
    );
}

#[tokio::test]
async fn cyclic_group_containers_are_visited_once() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let article = backend.tree.insert_file(
        "/sites/default/.content/a1.xml",
        "xmlcontent",
        "<article/>",
    );
    let g1 = backend
        .tree
        .insert_file("/sites/default/.groups/g1.xml", "groupcontainer", "g1");
    let g2 = backend
        .tree
        .insert_file("/sites/default/.groups/g2.xml", "groupcontainer", "g2");
    backend
        .relations
        .add_content_referrer(article.structure_id, g1.clone());
    backend
        .relations
        .add_content_referrer(g1.structure_id, g2.clone());
    backend
        .relations
        .add_content_referrer(g2.structure_id, g1.clone());
    backend
        .relations
        .add_content_referrer(g2.structure_id, g2.clone());

    let outer = backend
        .tree
        .insert_file("/sites/default/outer.html", "containerpage", "outer");
    backend
        .relations
        .add_content_referrer(g2.structure_id, outer);
    let inner = backend
        .tree
        .insert_file("/sites/default/inner.html", "containerpage", "inner");
    backend
        .relations
        .add_content_referrer(g1.structure_id, inner);
    backend
        .tree
        .insert_file("/sites/default/other.html", "containerpage", "other");

    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");
    touch(&export_root.join("outer.html"));
    touch(&export_root.join("inner.html"));
    touch(&export_root.join("other.html"));

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        engine(&manager, &backend)
            .scrub(Some(vec![changed(&backend, "/sites/default/.content/a1.xml")])),
    )
    .await
    .expect("container cycle terminates")
    .expect("scrub runs");

    assert_eq!(report.errors, 0);
    assert_eq!(files_below(&export_root), vec!["other.html".to_string()]);
}

#[tokio::test]
async fn rendered_subtree_purges_sibling_pages() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/a.css", PLAIN_TYPE, "a");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");

    touch(&export_root.join("news/a.css"));
    touch(&export_root.join("news/list.html"));
    touch(&export_root.join("news/2024/item.html"));
    touch(&export_root.join("news/logo.png"));

    let engine = ScrubEngine::new(
        Arc::clone(manager.translator()),
        backend.collaborators(),
        Arc::new(RenderedSubtree::new(".html")),
    );
    engine
        .scrub(Some(vec![changed(&backend, "/sites/default/news/a.css")]))
        .await
        .expect("scrub runs");

    assert_eq!(files_below(&export_root), vec!["news/logo.png".to_string()]);
}

#[tokio::test]
async fn unchanged_entries_are_left_alone() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let record = backend
        .tree
        .insert_file("/sites/default/a.css", PLAIN_TYPE, "a");
    let manager = manager(&backend, settings(dir.path()), &[]);
    let export_root = dir.path().join("export");
    touch(&export_root.join("a.css"));

    let report = engine(&manager, &backend)
        .scrub(Some(vec![PublishedEntry::from_resource(
            &record,
            ChangeState::Unchanged,
        )]))
        .await
        .expect("scrub runs");

    assert_eq!(report.purged_files, 0);
    assert_eq!(files_below(&export_root), vec!["a.css".to_string()]);
}
