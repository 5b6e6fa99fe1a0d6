//! Helpers for slash-separated virtual and real resource names.
//!
//! Folder names always end with `/`; file names never do. All helpers work on
//! borrowed `str` and never touch the filesystem.

/// Root of the administrative/system area of the content tree.
pub const SYSTEM_FOLDER: &str = "/system/";

pub fn is_folder(path: &str) -> bool {
    path.ends_with('/')
}

pub fn is_system_path(root_path: &str) -> bool {
    root_path.starts_with(SYSTEM_FOLDER)
}

/// Parent folder of `path`, including the trailing slash. `None` for `/`.
pub fn parent_folder(path: &str) -> Option<&str> {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return None;
    }
    trimmed.rfind('/').map(|idx| &path[..=idx])
}

/// The folder that contains `path`, or `path` itself when it names a folder.
pub fn folder_of(path: &str) -> &str {
    if is_folder(path) {
        path
    } else {
        parent_folder(path).unwrap_or("/")
    }
}

/// Last segment of `path` without the trailing slash of folders.
pub fn name(path: &str) -> &str {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Extension of a file name (text after the last dot), ignoring dot-files.
pub fn extension(file_name: &str) -> Option<&str> {
    match file_name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&file_name[idx + 1..]),
    }
}

/// File name with its last extension removed.
pub fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(idx) => &file_name[..idx],
    }
}

/// Insert `marker` directly before the extension of the last path segment.
///
/// `/a/b.html` + `_7` becomes `/a/b_7.html`; names without an extension get
/// the marker appended.
pub fn insert_before_extension(path: &str, marker: &str) -> String {
    let segment_start = path.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    let file_name = &path[segment_start..];
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => {
            let split = segment_start + dot;
            format!("{}{}{}", &path[..split], marker, &path[split..])
        }
        _ => format!("{path}{marker}"),
    }
}

/// Join a site root (no trailing slash) and a site-relative path.
pub fn add_site_root(site_root: &str, path: &str) -> String {
    let root = site_root.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{root}{path}")
    } else {
        format!("{root}/{path}")
    }
}

/// Strip `site_root` from a root path, returning the site-relative remainder.
pub fn remove_site_root<'a>(site_root: &str, root_path: &'a str) -> Option<&'a str> {
    let root = site_root.trim_end_matches('/');
    if root.is_empty() {
        return Some(root_path);
    }
    let rest = root_path.strip_prefix(root)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// All folders from `folder` up to `/`, nearest first.
pub fn ancestors(folder: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(folder_of(folder));
    std::iter::from_fn(move || {
        let current = next?;
        next = parent_folder(current);
        Some(current)
    })
}

/// Number of non-empty segments in `path`.
pub fn segment_count(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

/// Ensure a leading and trailing slash (`name` becomes `/name/`).
pub fn as_folder_name(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_folder_of_files_and_folders() {
        assert_eq!(parent_folder("/a/b/c.html"), Some("/a/b/"));
        assert_eq!(parent_folder("/a/b/"), Some("/a/"));
        assert_eq!(parent_folder("/a"), Some("/"));
        assert_eq!(parent_folder("/"), None);
    }

    #[test]
    fn names_and_extensions() {
        assert_eq!(name("/a/b/c.html"), "c.html");
        assert_eq!(name("/a/b/"), "b");
        assert_eq!(extension("c.jsp.html"), Some("html"));
        assert_eq!(extension(".hidden"), None);
        assert_eq!(strip_extension("c.jsp.html"), "c.jsp");
        assert_eq!(strip_extension("readme"), "readme");
    }

    #[test]
    fn marker_goes_before_extension_of_last_segment() {
        assert_eq!(insert_before_extension("/a.b/c.html", "_7"), "/a.b/c_7.html");
        assert_eq!(insert_before_extension("/a.b/c", "_7"), "/a.b/c_7");
    }

    #[test]
    fn site_root_round_trip() {
        let root = add_site_root("/sites/default", "/news/a.html");
        assert_eq!(root, "/sites/default/news/a.html");
        assert_eq!(remove_site_root("/sites/default", &root), Some("/news/a.html"));
        assert_eq!(remove_site_root("/sites/default", "/sites/defaultx/a"), None);
        assert_eq!(remove_site_root("", "/system/a"), Some("/system/a"));
    }

    #[test]
    fn ancestors_walk_to_root() {
        let all: Vec<_> = ancestors("/a/b/c.html").collect();
        assert_eq!(all, vec!["/a/b/", "/a/", "/"]);
    }

    #[test]
    fn folder_names_are_normalised() {
        assert_eq!(as_folder_name("x"), "/x/");
        assert_eq!(as_folder_name("/x/y"), "/x/y/");
        assert_eq!(segment_count("/x/y/"), 2);
    }
}
