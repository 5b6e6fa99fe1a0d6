//! Parameter handling for parameterised links.

use url::form_urlencoded;

use crate::domain::paths;

/// Canonical form of a query string: pairs sorted, re-encoded.
///
/// `b=2&a=1` and `?a=1&b=2` both become `a=1&b=2`. Returns `None` when no
/// pair remains.
pub fn normalize_parameters(query: &str) -> Option<String> {
    let query = query.trim().trim_start_matches('?');
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort();
    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish(),
    )
}

/// Insert the link id before the extension: `/a/b.html` → `/a/b_7.html`.
pub fn encode_link_id(rfs_name: &str, id: u64) -> String {
    paths::insert_before_extension(rfs_name, &format!("_{id}"))
}

/// Split `/a/b_7.html` into `(/a/b.html, 7)`.
pub fn decode_link_id(rfs_name: &str) -> Option<(String, u64)> {
    let name = paths::name(rfs_name);
    let folder = &rfs_name[..rfs_name.len() - name.len()];
    let (stem, extension) = match paths::extension(name) {
        Some(extension) => (paths::strip_extension(name), Some(extension)),
        None => (name, None),
    };
    let (base, digits) = stem.rsplit_once('_')?;
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = digits.parse().ok()?;
    let restored = match extension {
        Some(extension) => format!("{folder}{base}.{extension}"),
        None => format!("{folder}{base}"),
    };
    Some((restored, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_order_does_not_matter() {
        assert_eq!(normalize_parameters("b=2&a=1"), normalize_parameters("?a=1&b=2"));
        assert_eq!(normalize_parameters("a=1&b=2").as_deref(), Some("a=1&b=2"));
        assert_eq!(normalize_parameters("q=a b").as_deref(), Some("q=a+b"));
        assert_eq!(normalize_parameters(""), None);
    }

    #[test]
    fn link_ids_round_trip() {
        let encoded = encode_link_id("/a.b/c.html", 7);
        assert_eq!(encoded, "/a.b/c_7.html");
        assert_eq!(decode_link_id(&encoded), Some(("/a.b/c.html".to_string(), 7)));
        assert_eq!(decode_link_id("/a/c_7"), Some(("/a/c".to_string(), 7)));
    }

    #[test]
    fn names_without_ids_are_left_alone() {
        assert_eq!(decode_link_id("/a/my_page.html"), None);
        assert_eq!(decode_link_id("/a/_7.html"), None);
        assert_eq!(decode_link_id("/a/page.html"), None);
    }
}
