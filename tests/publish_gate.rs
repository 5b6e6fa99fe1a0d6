mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use static_export::application::export::ExportHandler;
use static_export::application::manager::PublishOutcome;
use static_export::application::repos::{
    ExportCollaborators, RenderError, RenderRequest, RenderedPage, Renderer,
};
use static_export::domain::entities::PublishedEntry;
use static_export::domain::types::ChangeState;
use static_export::infra::memory::{MemoryBackend, MemoryRenderer};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use common::{manager, manager_with, settings, tempdir};

/// Renderer that parks every render until a permit is handed out.
struct ParkedRenderer {
    inner: Arc<MemoryRenderer>,
    started: Notify,
    permits: Semaphore,
}

#[async_trait]
impl Renderer for ParkedRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        self.started.notify_one();
        self.permits
            .acquire()
            .await
            .expect("semaphore open")
            .forget();
        self.inner.render(request).await
    }
}

fn parked(backend: &MemoryBackend) -> (ExportCollaborators, Arc<ParkedRenderer>) {
    let renderer = Arc::new(ParkedRenderer {
        inner: Arc::clone(&backend.renderer),
        started: Notify::new(),
        permits: Semaphore::new(0),
    });
    let collaborators = ExportCollaborators {
        renderer: renderer.clone(),
        ..backend.collaborators()
    };
    (collaborators, renderer)
}

fn batch(backend: &MemoryBackend, root_path: &str) -> Vec<PublishedEntry> {
    let record = backend.tree.record(root_path).expect("resource exists");
    vec![PublishedEntry::from_resource(&record, ChangeState::New)]
}

#[tokio::test(start_paused = true)]
async fn second_publish_is_abandoned_while_the_first_holds_the_gate() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "home");
    let (collaborators, renderer) = parked(&backend);
    let manager = manager_with(collaborators, settings(dir.path()), &[]);

    let first = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    renderer.started.notified().await;
    assert!(manager.is_busy());

    let started = tokio::time::Instant::now();
    let second = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    assert_eq!(second.await.expect("join"), PublishOutcome::Abandoned);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(60));
    assert!(waited < Duration::from_secs(61));

    renderer.permits.add_permits(1);
    match first.await.expect("join") {
        PublishOutcome::Completed { export, .. } => {
            let report = export.expect("after-publish handler exports");
            assert_eq!(report.exported, 1);
            assert!(report.is_clean());
        }
        PublishOutcome::Abandoned => panic!("first publish held the gate"),
    }
    assert!(!manager.is_busy());
    assert!(dir.path().join("export/index.html").exists());
}

#[tokio::test(start_paused = true)]
async fn waiting_publish_runs_once_the_gate_frees_up() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "home");
    let (collaborators, renderer) = parked(&backend);
    let manager = manager_with(collaborators, settings(dir.path()), &[]);

    let first = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    renderer.started.notified().await;

    let second = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    tokio::time::sleep(Duration::from_secs(5)).await;
    renderer.permits.add_permits(2);

    assert!(matches!(
        first.await.expect("join"),
        PublishOutcome::Completed { .. }
    ));
    assert!(matches!(
        second.await.expect("join"),
        PublishOutcome::Completed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_waiting_publishes() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "home");
    let (collaborators, renderer) = parked(&backend);
    let manager = manager_with(collaborators, settings(dir.path()), &[]);

    let first = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    renderer.started.notified().await;

    let second = manager
        .on_publish(Uuid::new_v4(), batch(&backend, "/sites/default/index.html"))
        .expect("export enabled");
    tokio::time::sleep(Duration::from_secs(3)).await;
    let started = tokio::time::Instant::now();
    manager.shutdown();

    assert_eq!(second.await.expect("join"), PublishOutcome::Abandoned);
    assert!(started.elapsed() < Duration::from_secs(1));

    renderer.permits.add_permits(1);
    assert!(matches!(
        first.await.expect("join"),
        PublishOutcome::Completed { .. }
    ));
}

#[tokio::test]
async fn on_demand_handler_only_scrubs_after_publish() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/index.html", "jsp", "home");
    std::fs::create_dir_all(dir.path().join("export")).expect("export folder");
    std::fs::write(dir.path().join("export/index.html"), "stale").expect("stale file");

    let mut settings = settings(dir.path());
    settings.handler = ExportHandler::OnDemand;
    let manager = manager(&backend, settings, &[]);

    let mut entries = batch(&backend, "/sites/default/index.html");
    entries[0].state = ChangeState::Changed;
    let outcome = manager
        .on_publish(Uuid::new_v4(), entries)
        .expect("export enabled")
        .await
        .expect("join");

    assert_eq!(
        outcome,
        PublishOutcome::Completed {
            purged_files: 1,
            scrub_errors: 0,
            export: None,
        }
    );
    assert!(!dir.path().join("export/index.html").exists());
    assert_eq!(backend.renderer.render_count(), 0);
}
