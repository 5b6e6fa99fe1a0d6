//! Ordered export rules mapping virtual root paths onto real output folders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::application::error::ExportError;
use crate::config::{ExportSettings, RuleSettings};

pub const DEFAULT_RULE_NAME: &str = "default";

#[derive(Debug, Clone)]
pub struct RfsRule {
    name: String,
    /// `None` for the implicit default rule, which matches everything.
    source: Option<Regex>,
    rfs_prefix: String,
    export_path: PathBuf,
    work_path: PathBuf,
    backup_count: u32,
    relative_links: Option<bool>,
    related_system: Vec<Regex>,
}

impl RfsRule {
    fn from_settings(settings: &RuleSettings) -> Result<Self, ExportError> {
        let source = anchored(&settings.source)?;
        let related_system = settings
            .related_system
            .iter()
            .map(|pattern| anchored(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: settings.name.clone(),
            source: Some(source),
            rfs_prefix: settings.rfs_prefix.clone(),
            export_path: settings.export_path.clone(),
            work_path: settings.work_path.clone(),
            backup_count: settings.backup_count,
            relative_links: settings.relative_links,
            related_system,
        })
    }

    fn default_rule(export: &ExportSettings) -> Self {
        Self {
            name: DEFAULT_RULE_NAME.to_string(),
            source: None,
            rfs_prefix: export.rfs_prefix.clone(),
            export_path: export.export_path.clone(),
            work_path: export.work_path.clone(),
            backup_count: export.backup_count,
            relative_links: None,
            related_system: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.source.is_none()
    }

    pub fn rfs_prefix(&self) -> &str {
        &self.rfs_prefix
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    pub fn work_path(&self) -> &Path {
        &self.work_path
    }

    pub fn backup_count(&self) -> u32 {
        self.backup_count
    }

    /// Whether links governed by this rule are written relative to the page.
    pub fn use_relative_links(&self, global_default: bool) -> bool {
        self.relative_links.unwrap_or(global_default)
    }

    pub fn matches(&self, root_path: &str) -> bool {
        self.source
            .as_ref()
            .is_none_or(|source| source.is_match(root_path))
    }

    pub fn matches_related_system(&self, target_root_path: &str) -> bool {
        self.related_system
            .iter()
            .any(|pattern| pattern.is_match(target_root_path))
    }

    /// Real name of `rfs_name` under this rule.
    pub fn real_name(&self, rfs_name: &str) -> String {
        format!("{}{}", self.rfs_prefix, rfs_name)
    }

    /// Output file of `rfs_name` inside `base` (the export or work folder).
    pub fn file_in(&self, base: &Path, rfs_name: &str) -> PathBuf {
        base.join(rfs_name.trim_start_matches('/'))
    }

    pub fn export_file(&self, rfs_name: &str) -> PathBuf {
        self.file_in(&self.export_path, rfs_name)
    }

    /// `rfs_name` part of `real_name` when it carries this rule's prefix.
    pub fn strip_prefix<'a>(&self, real_name: &'a str) -> Option<&'a str> {
        let rest = real_name.strip_prefix(self.rfs_prefix.as_str())?;
        if rest.starts_with('/') {
            Some(rest)
        } else if rest.is_empty() {
            Some("/")
        } else {
            None
        }
    }
}

/// Explicit rules in configured order followed by the implicit default rule.
///
/// Built once and read without locking afterwards.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<RfsRule>,
    default: RfsRule,
}

impl RuleTable {
    pub fn from_settings(
        export: &ExportSettings,
        rules: &[RuleSettings],
    ) -> Result<Self, ExportError> {
        let rules = rules
            .iter()
            .map(RfsRule::from_settings)
            .collect::<Result<Vec<_>, _>>()?;
        let table = Self {
            rules,
            default: RfsRule::default_rule(export),
        };
        table.validate(export)?;
        Ok(table)
    }

    fn validate(&self, export: &ExportSettings) -> Result<(), ExportError> {
        let mut by_export_path: HashMap<&Path, &RfsRule> = HashMap::new();
        for rule in self.iter() {
            if let Some(other) = by_export_path.insert(&rule.export_path, rule)
                && other.work_path != rule.work_path
            {
                return Err(ExportError::configuration(format!(
                    "rules `{}` and `{}` share the export folder `{}` \
                     but stage into different work folders",
                    other.name,
                    rule.name,
                    rule.export_path.display()
                )));
            }
            if rule.export_path.as_os_str().is_empty() {
                return Err(ExportError::configuration(format!(
                    "rule `{}` has an empty export path",
                    rule.name
                )));
            }
            if let Some(install) = export.install_path.as_ref() {
                for path in [&rule.export_path, &rule.work_path] {
                    if path == install || install.starts_with(path) {
                        return Err(ExportError::configuration(format!(
                            "rule `{}` would write into the installation folder `{}`",
                            rule.name,
                            install.display()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// First rule whose source matches `root_path`, else the default rule.
    pub fn match_rule(&self, root_path: &str) -> &RfsRule {
        self.rules
            .iter()
            .find(|rule| rule.matches(root_path))
            .unwrap_or(&self.default)
    }

    /// Rule governing `source_root_path` that also claims the system resource `target`.
    pub fn match_related(&self, source_root_path: &str, target: &str) -> Option<&RfsRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(source_root_path) && rule.matches_related_system(target))
    }

    /// Rule whose prefix starts `real_name`, longest prefix first.
    pub fn match_real_name<'a>(&self, real_name: &'a str) -> Option<(&RfsRule, &'a str)> {
        let mut best: Option<(&RfsRule, &'a str)> = None;
        for rule in self.iter() {
            if let Some(rfs_name) = rule.strip_prefix(real_name) {
                let longer = best
                    .map(|(current, _)| rule.rfs_prefix.len() > current.rfs_prefix.len())
                    .unwrap_or(true);
                if longer {
                    best = Some((rule, rfs_name));
                }
            }
        }
        best
    }

    pub fn default_rule(&self) -> &RfsRule {
        &self.default
    }

    /// Explicit rules in order, then the default rule.
    pub fn iter(&self) -> impl Iterator<Item = &RfsRule> {
        self.rules.iter().chain(std::iter::once(&self.default))
    }
}

fn anchored(pattern: &str) -> Result<Regex, ExportError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
        ExportError::configuration(format!("invalid rule pattern `{pattern}`: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, source: &str, prefix: &str) -> RuleSettings {
        RuleSettings {
            name: name.to_string(),
            source: source.to_string(),
            rfs_prefix: prefix.to_string(),
            export_path: PathBuf::from(format!("/srv/{name}")),
            work_path: PathBuf::from(format!("/srv/{name}-work")),
            backup_count: 0,
            relative_links: None,
            related_system: vec!["/system/modules/.*".to_string()],
        }
    }

    fn table(rules: &[RuleSettings]) -> RuleTable {
        RuleTable::from_settings(&ExportSettings::default(), rules).expect("valid rules")
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = table(&[rule("r1", "/a/.*", "/one"), rule("r2", "/a/b/.*", "/two")]);
        assert_eq!(table.match_rule("/a/b/c").name(), "r1");
    }

    #[test]
    fn unmatched_paths_use_the_default_rule() {
        let table = table(&[rule("r1", "/a/.*", "/one")]);
        let matched = table.match_rule("/z/c.html");
        assert!(matched.is_default());
        assert_eq!(matched.rfs_prefix(), "/export");
    }

    #[test]
    fn patterns_match_the_whole_path() {
        let table = table(&[rule("r1", "/a/", "/one")]);
        assert!(table.match_rule("/a/b.html").is_default());
        assert_eq!(table.match_rule("/a/").name(), "r1");
    }

    #[test]
    fn related_system_needs_both_matches() {
        let table = table(&[rule("r1", "/sites/shop/.*", "/shop")]);
        let related = table.match_related("/sites/shop/index.html", "/system/modules/a.css");
        assert_eq!(related.map(RfsRule::name), Some("r1"));
        assert!(
            table
                .match_related("/sites/other/index.html", "/system/modules/a.css")
                .is_none()
        );
        assert!(
            table
                .match_related("/sites/shop/index.html", "/system/other/a.css")
                .is_none()
        );
    }

    #[test]
    fn real_names_pick_the_longest_prefix() {
        let table = table(&[rule("shop", "/sites/shop/.*", "/export/shop")]);
        let (rule, rfs) = table
            .match_real_name("/export/shop/a.html")
            .expect("prefix matches");
        assert_eq!(rule.name(), "shop");
        assert_eq!(rfs, "/a.html");

        let (rule, rfs) = table.match_real_name("/export/shopping.html").expect("default");
        assert!(rule.is_default());
        assert_eq!(rfs, "/shopping.html");
        assert!(table.match_real_name("/other/a.html").is_none());
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let err = RuleTable::from_settings(&ExportSettings::default(), &[rule("bad", "(", "/x")])
            .expect_err("invalid regex");
        assert!(matches!(err, ExportError::Configuration { .. }));
    }

    #[test]
    fn shared_export_folder_needs_a_shared_work_folder() {
        let mut news = rule("news", "/sites/news/.*", "/news");
        let mut shop = rule("shop", "/sites/shop/.*", "/shop");
        news.export_path = PathBuf::from("/srv/site");
        shop.export_path = PathBuf::from("/srv/site");
        let rules = [news.clone(), shop.clone()];
        let err = RuleTable::from_settings(&ExportSettings::default(), &rules)
            .expect_err("diverging work folders");
        assert!(matches!(err, ExportError::Configuration { .. }));

        shop.work_path = news.work_path.clone();
        let table = table(&[news, shop]);
        assert_eq!(table.match_rule("/sites/shop/a.html").name(), "shop");
    }

    #[test]
    fn export_into_install_folder_is_rejected() {
        let export = ExportSettings {
            install_path: Some(PathBuf::from("/srv/r1")),
            ..ExportSettings::default()
        };
        let err = RuleTable::from_settings(&export, &[rule("r1", "/a/.*", "/one")])
            .expect_err("export over install");
        assert!(matches!(err, ExportError::Configuration { .. }));
    }
}
