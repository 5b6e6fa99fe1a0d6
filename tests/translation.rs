mod common;

use static_export::application::translator::LinkStrategy;
use static_export::infra::memory::{MemoryBackend, PLAIN_TYPE};

use common::{ctx, manager, rule, settings, tempdir};

#[tokio::test]
async fn plain_resources_round_trip() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/css/site.css", PLAIN_TYPE, "body {}");
    let manager = manager(&backend, settings(dir.path()), &[]);

    let real = manager
        .virtual_to_real(&ctx(), "/css/site.css", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/css/site.css");

    let data = manager
        .real_to_virtual(&ctx(), &real)
        .await
        .expect("reversible");
    assert_eq!(data.vfs_name, "/css/site.css");
    assert_eq!(data.root_path, "/sites/default/css/site.css");
    assert_eq!(data.rfs_name(), "/css/site.css");
    assert!(data.parameters.is_none());
}

#[tokio::test]
async fn rendered_resources_get_the_export_suffix() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/index.jsp", "jsp", "<h1>News</h1>");
    backend
        .tree
        .insert_file("/sites/default/news/list.html", "jsp", "<ul></ul>");
    let manager = manager(&backend, settings(dir.path()), &[]);

    let real = manager
        .virtual_to_real(&ctx(), "/news/index.jsp", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/news/index.jsp.html");
    let data = manager.real_to_virtual(&ctx(), &real).await.expect("reversible");
    assert_eq!(data.vfs_name, "/news/index.jsp");

    let real = manager
        .virtual_to_real(&ctx(), "/news/list.html", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/news/list.html");
}

#[tokio::test]
async fn custom_export_suffixes_round_trip() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news", "jsp", "<h1>News</h1>");
    backend
        .tree
        .set_attribute("/sites/default/news", "export.suffix", ".htm")
        .expect("file exists");
    backend
        .tree
        .insert_file("/sites/default/feed", PLAIN_TYPE, "feed");
    let manager = manager(&backend, settings(dir.path()), &[]);

    let real = manager
        .virtual_to_real(&ctx(), "/news", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/news.htm");
    let data = manager.real_to_virtual(&ctx(), &real).await.expect("reversible");
    assert_eq!(data.vfs_name, "/news");
    assert_eq!(data.root_path, "/sites/default/news");

    let err = manager
        .real_to_virtual(&ctx(), "/export/feed.htm")
        .await
        .expect_err("plain resources keep their own name");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn deleted_templates_keep_their_rendered_name() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let manager = manager(&backend, settings(dir.path()), &[]);

    let real = manager
        .virtual_to_real(&ctx(), "/news/gone.jsp", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/news/gone.jsp.html");
}

#[tokio::test]
async fn parameterised_links_use_stable_ids() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/index.jsp", "jsp", "<h1>News</h1>");
    let manager = manager(&backend, settings(dir.path()), &[]);

    let first = manager
        .virtual_to_real(&ctx(), "/news/index.jsp", Some("b=2&a=1"))
        .await
        .expect("translatable");
    assert_eq!(first, "/export/news/index.jsp_1.html");

    let reordered = manager
        .virtual_to_real(&ctx(), "/news/index.jsp", Some("?a=1&b=2"))
        .await
        .expect("translatable");
    assert_eq!(reordered, first);

    let other = manager
        .virtual_to_real(&ctx(), "/news/index.jsp", Some("page=3"))
        .await
        .expect("translatable");
    assert_eq!(other, "/export/news/index.jsp_2.html");

    manager.on_clear_caches();
    let again = manager
        .virtual_to_real(&ctx(), "/news/index.jsp", Some("a=1&b=2"))
        .await
        .expect("translatable");
    assert_eq!(again, first);

    let data = manager.real_to_virtual(&ctx(), &first).await.expect("reversible");
    assert_eq!(data.vfs_name, "/news/index.jsp");
    assert_eq!(data.parameters.as_deref(), Some("a=1&b=2"));
    assert_eq!(data.rfs_name(), "/news/index.jsp_1.html");
}

#[tokio::test]
async fn first_matching_rule_decides_the_prefix() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/a.css", PLAIN_TYPE, "a");
    backend
        .tree
        .insert_file("/sites/default/b.css", PLAIN_TYPE, "b");
    let mut news = rule("news", "/sites/default/news/.*", "/news-export", dir.path());
    news.relative_links = Some(true);
    let site = rule("site", "/sites/default/.*", "/site-export", dir.path());
    let manager = manager(&backend, settings(dir.path()), &[news, site]);

    assert_eq!(
        manager
            .virtual_to_real(&ctx(), "/news/a.css", None)
            .await
            .expect("translatable"),
        "/news-export/news/a.css"
    );
    assert_eq!(
        manager
            .virtual_to_real(&ctx(), "/b.css", None)
            .await
            .expect("translatable"),
        "/site-export/b.css"
    );

    let data = manager
        .real_to_virtual(&ctx(), "/news-export/news/a.css")
        .await
        .expect("reversible");
    assert_eq!(data.root_path, "/sites/default/news/a.css");

    assert!(manager.rule_for_link(&ctx(), "/news/a.css"));
    assert!(!manager.rule_for_link(&ctx(), "/b.css"));
}

#[tokio::test]
async fn the_longest_export_alias_wins() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/a/b/c.css", PLAIN_TYPE, "c");
    backend
        .tree
        .insert_file("/sites/default/a/d.css", PLAIN_TYPE, "d");
    backend
        .tree
        .set_attribute("/sites/default/a/", "exportname", "x")
        .expect("folder exists");
    backend
        .tree
        .set_attribute("/sites/default/a/b/", "exportname", "x/y")
        .expect("folder exists");
    let manager = manager(&backend, settings(dir.path()), &[]);

    assert_eq!(
        manager
            .virtual_to_real(&ctx(), "/a/b/c.css", None)
            .await
            .expect("translatable"),
        "/export/x/y/c.css"
    );
    assert_eq!(
        manager
            .virtual_to_real(&ctx(), "/a/d.css", None)
            .await
            .expect("translatable"),
        "/export/x/d.css"
    );

    let data = manager
        .real_to_virtual(&ctx(), "/export/x/y/c.css")
        .await
        .expect("reversible");
    assert_eq!(data.root_path, "/sites/default/a/b/c.css");
    assert_eq!(data.vfs_name, "/a/b/c.css");
}

#[tokio::test]
async fn locale_folders_prefix_real_names() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/about.css", PLAIN_TYPE, "about");
    backend
        .tree
        .set_attribute("/sites/default/", "locale", "de")
        .expect("folder exists");
    let mut settings = settings(dir.path());
    settings.strategy = LinkStrategy::LocaleFolders {
        locales: vec!["en".to_string(), "de".to_string()],
    };
    let manager = manager(&backend, settings, &[]);

    let real = manager
        .virtual_to_real(&ctx(), "/about.css", None)
        .await
        .expect("translatable");
    assert_eq!(real, "/export/de/about.css");

    let data = manager.real_to_virtual(&ctx(), &real).await.expect("reversible");
    assert_eq!(data.vfs_name, "/about.css");
}

#[tokio::test]
async fn folder_requests_resolve_to_the_default_document() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/news/start.html", "jsp", "start");
    backend
        .tree
        .set_default_file("/sites/default/news/", "start.html")
        .expect("folder exists");
    let manager = manager(&backend, settings(dir.path()), &[]);

    let data = manager
        .real_to_virtual(&ctx(), "/export/news/")
        .await
        .expect("folder resolves");
    assert_eq!(data.rfs_name(), "/news/index.html");
    assert_eq!(
        data.resource.map(|resource| resource.root_path).as_deref(),
        Some("/sites/default/news/start.html")
    );
}

#[tokio::test]
async fn unknown_real_names_are_not_found() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    let manager = manager(&backend, settings(dir.path()), &[]);

    let err = manager
        .real_to_virtual(&ctx(), "/export/missing.css")
        .await
        .expect_err("nothing there");
    assert!(err.is_not_found());

    let err = manager
        .real_to_virtual(&ctx(), "/elsewhere/missing.css")
        .await
        .expect_err("no rule owns the prefix");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn links_to_unexported_resources_stay_dynamic() {
    let dir = tempdir();
    let backend = MemoryBackend::default();
    backend
        .tree
        .insert_file("/sites/default/public.css", PLAIN_TYPE, "p");
    backend
        .tree
        .insert_file("/sites/default/private.jsp", "jsp", "secret");
    backend
        .tree
        .set_attribute("/sites/default/private.jsp", "export", "false")
        .expect("file exists");
    let mut settings = settings(dir.path());
    settings.vfs_prefix = "/app".to_string();
    let manager = manager(&backend, settings, &[]);

    assert_eq!(
        manager
            .link_for(&ctx(), "/public.css", None)
            .await
            .expect("link"),
        "/export/public.css"
    );
    assert_eq!(
        manager
            .link_for(&ctx(), "/private.jsp", Some("x=1"))
            .await
            .expect("link"),
        "/app/private.jsp?x=1"
    );
}
