//! Output-suffix rewriting for rendered resources.

use std::path::Path;

use crate::domain::paths;

/// Append `suffix` unless the name already ends with it (`page.jsp` → `page.jsp.html`).
pub fn with_export_suffix(rfs_name: &str, suffix: &str) -> String {
    if rfs_name.ends_with(suffix) {
        rfs_name.to_string()
    } else {
        format!("{rfs_name}{suffix}")
    }
}

/// Remove one outer suffix added by rendering.
///
/// The export suffix itself is always removable; any other extension only when
/// an inner extension remains (`a.jsp.htm` → `a.jsp`, but `a.css` stays).
pub fn strip_outer_suffix(rfs_name: &str, export_suffix: &str) -> Option<String> {
    if paths::is_folder(rfs_name) {
        return None;
    }
    let name = paths::name(rfs_name);
    let stem_len = if name.len() > export_suffix.len() && name.ends_with(export_suffix) {
        name.len() - export_suffix.len()
    } else {
        let stem = paths::strip_extension(name);
        paths::extension(stem)?;
        stem.len()
    };
    let cut = rfs_name.len() - name.len() + stem_len;
    Some(rfs_name[..cut].to_string())
}

pub fn has_template_suffix(rfs_name: &str, template_suffixes: &[String]) -> bool {
    let name = paths::name(rfs_name).to_ascii_lowercase();
    template_suffixes
        .iter()
        .any(|suffix| name.ends_with(suffix.as_str()))
}

/// First file in `dir` (by name) that is `base_name` plus one more suffix.
///
/// Used for deleted templates, whose rendered suffix can no longer be derived
/// from the content tree.
pub async fn sibling_with_suffix(dir: &Path, base_name: &str) -> Option<String> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let prefix = format!("{base_name}.");
    let mut best: Option<String> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with(&prefix) || name.len() == prefix.len() {
            continue;
        }
        if best.as_ref().is_none_or(|current| name < *current) {
            best = Some(name);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_appended_once() {
        assert_eq!(with_export_suffix("/a/page.jsp", ".html"), "/a/page.jsp.html");
        assert_eq!(with_export_suffix("/a/news", ".html"), "/a/news.html");
        assert_eq!(with_export_suffix("/a/index.html", ".html"), "/a/index.html");
    }

    #[test]
    fn outer_suffixes_strip_one_at_a_time() {
        assert_eq!(
            strip_outer_suffix("/a/page.jsp.html", ".html").as_deref(),
            Some("/a/page.jsp")
        );
        assert_eq!(strip_outer_suffix("/a/news.html", ".html").as_deref(), Some("/a/news"));
        assert_eq!(
            strip_outer_suffix("/a.b/page.jsp.htm", ".html").as_deref(),
            Some("/a.b/page.jsp")
        );
        assert_eq!(strip_outer_suffix("/a/style.css", ".html"), None);
        assert_eq!(strip_outer_suffix("/a/.html", ".html"), None);
        assert_eq!(strip_outer_suffix("/a/", ".html"), None);
    }

    #[test]
    fn template_suffixes_are_case_insensitive() {
        let suffixes = vec![".jsp".to_string()];
        assert!(has_template_suffix("/a/Page.JSP", &suffixes));
        assert!(!has_template_suffix("/a/page.html", &suffixes));
    }

    #[tokio::test]
    async fn sibling_scan_picks_the_first_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["page.jsp.htm", "page.jsp.html", "page.jsp", "other.jsp.html"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }

        let found = sibling_with_suffix(dir.path(), "page.jsp").await;
        assert_eq!(found.as_deref(), Some("page.jsp.htm"));
        assert_eq!(sibling_with_suffix(dir.path(), "missing.jsp").await, None);
    }
}
