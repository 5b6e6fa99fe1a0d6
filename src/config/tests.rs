use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.export.export_path = Some(PathBuf::from("/srv/file-export"));

    let overrides = CommonOverrides {
        log_level: Some("debug".to_string()),
        export_path: Some(PathBuf::from("/srv/override")),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.export.export_path, PathBuf::from("/srv/override"));
}

#[test]
fn defaults_follow_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.export.enabled);
    assert_eq!(settings.export.handler, ExportHandler::AfterPublish);
    assert_eq!(settings.export.strategy, LinkStrategy::Default);
    assert_eq!(settings.export.export_suffix, ".html");
    assert_eq!(settings.export.default_file(), "index.html");
    assert_eq!(settings.export.busy_poll, Duration::from_secs(1));
    assert_eq!(settings.export.busy_max_polls, 60);
    assert!(settings.rules.is_empty());
    assert_eq!(settings.database.max_connections.get(), 4);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_overrides(&CommonOverrides {
        log_json: Some(true),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn invalid_rule_pattern_is_rejected() {
    let mut raw = RawSettings::default();
    raw.rules.push(RawRuleSettings {
        source: Some("/sites/(unclosed".to_string()),
        ..Default::default()
    });

    let err = Settings::from_raw(raw).expect_err("bad regex");
    assert!(matches!(err, LoadError::Invalid { key: "rules.source", .. }));
}

#[test]
fn export_path_equal_to_install_path_is_rejected() {
    let mut raw = RawSettings::default();
    raw.export.export_path = Some(PathBuf::from("/opt/app"));
    raw.export.install_path = Some(PathBuf::from("/opt/app"));

    let err = Settings::from_raw(raw).expect_err("export over install");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "export.export_path",
            ..
        }
    ));
}

#[test]
fn export_path_containing_install_path_is_rejected() {
    let mut raw = RawSettings::default();
    raw.export.export_path = Some(PathBuf::from("/opt"));
    raw.export.work_path = Some(PathBuf::from("/var/work"));
    raw.export.install_path = Some(PathBuf::from("/opt/app"));

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_poll_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.export.busy_poll_ms = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero poll");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "export.busy_poll_ms",
            ..
        }
    ));
}

#[test]
fn locale_strategy_requires_locales() {
    let mut raw = RawSettings::default();
    raw.export.strategy = Some("locale-folders".to_string());
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.export.locales = Some(vec!["en".to_string(), "de".to_string()]);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.export.strategy,
        LinkStrategy::LocaleFolders {
            locales: vec!["en".to_string(), "de".to_string()]
        }
    );
}

#[test]
fn rules_inherit_global_paths_and_normalise_prefixes() {
    let mut raw = RawSettings::default();
    raw.export.export_path = Some(PathBuf::from("/srv/export"));
    raw.export.backup_count = Some(2);
    raw.rules.push(RawRuleSettings {
        name: Some("shop".to_string()),
        source: Some("/sites/shop/.*".to_string()),
        rfs_prefix: Some("shop/".to_string()),
        related_system: vec!["/system/modules/shop/.*".to_string()],
        ..Default::default()
    });

    let settings = Settings::from_raw(raw).expect("valid settings");
    let rule = &settings.rules[0];
    assert_eq!(rule.name, "shop");
    assert_eq!(rule.rfs_prefix, "/shop");
    assert_eq!(rule.export_path, PathBuf::from("/srv/export"));
    assert_eq!(rule.backup_count, 2);
    assert_eq!(rule.relative_links, None);
}

#[test]
fn suffixes_are_normalised() {
    let mut raw = RawSettings::default();
    raw.export.export_suffix = Some("HTM".to_string());
    raw.export.template_suffixes = Some(vec!["jsp".to_string(), ".JSPF".to_string()]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.export.export_suffix, ".htm");
    assert_eq!(settings.export.template_suffixes, vec![".jsp", ".jspf"]);
}

#[test]
fn parse_export_arguments() {
    let args = CliArgs::parse_from([
        "static-export",
        "export",
        "--purge",
        "--export-path",
        "/tmp/out",
        "/tmp/site.toml",
    ]);

    match args.command {
        Command::Export(export) => {
            assert!(export.purge);
            assert_eq!(export.archive, PathBuf::from("/tmp/site.toml"));
            assert_eq!(
                export.overrides.export_path.as_deref(),
                Some(std::path::Path::new("/tmp/out"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_translate_arguments() {
    let args = CliArgs::parse_from([
        "static-export",
        "translate",
        "/tmp/site.toml",
        "/news/a.html",
        "--params",
        "page=2",
    ]);

    match args.command {
        Command::Translate(translate) => {
            assert_eq!(translate.vfs_path, "/news/a.html");
            assert_eq!(translate.params.as_deref(), Some("page=2"));
            assert_eq!(translate.site_root, None);
        }
        _ => panic!("wrong command parsed"),
    }
}
