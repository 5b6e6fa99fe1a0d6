//! Link strategies selected by configuration.

/// How real names are laid out beyond alias and suffix handling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkStrategy {
    /// Real names mirror the (aliased) virtual names.
    #[default]
    Default,
    /// Real names start with the resource's locale folder, e.g. `/en/news/`.
    LocaleFolders { locales: Vec<String> },
}

impl LinkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStrategy::Default => "default",
            LinkStrategy::LocaleFolders { .. } => "locale-folders",
        }
    }

    fn is_locale(&self, segment: &str) -> bool {
        match self {
            LinkStrategy::Default => false,
            LinkStrategy::LocaleFolders { locales } => locales.iter().any(|l| l == segment),
        }
    }

    /// Prefix `rfs_name` with `locale` unless it already starts with a locale folder.
    pub fn apply(&self, rfs_name: &str, locale: Option<&str>) -> String {
        let Some(locale) = locale.filter(|locale| self.is_locale(locale)) else {
            return rfs_name.to_string();
        };
        if self.is_locale(first_segment(rfs_name)) {
            return rfs_name.to_string();
        }
        format!("/{locale}{rfs_name}")
    }

    /// `rfs_name` without its leading locale folder, if it has one.
    pub fn strip<'a>(&self, rfs_name: &'a str) -> Option<&'a str> {
        let segment = first_segment(rfs_name);
        if !self.is_locale(segment) {
            return None;
        }
        let rest = rfs_name.get(segment.len() + 1..)?;
        rest.starts_with('/').then_some(rest)
    }
}

fn first_segment(rfs_name: &str) -> &str {
    rfs_name
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
}
