//! Paths record the location reached while descending from the pattern root
//! into the data tree. They are handed to operators and aggregators so
//! captures can derive context-aware keys.

use itertools::Itertools;
use std::fmt;

/// A single step on the way from the pattern root into the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Renders a path in dotted form, e.g. `orders.2.total`.
pub fn path_to_string(path: &[PathSegment]) -> String {
    path.iter().map(PathSegment::to_string).join(".")
}

/// The last segment of the path, rendered, or the empty string at the root.
pub fn path_index(path: &[PathSegment]) -> String {
    path.last().map(PathSegment::to_string).unwrap_or_default()
}

/// All but the last segment.
pub fn path_parent(path: &[PathSegment]) -> &[PathSegment] {
    &path[..path.len().saturating_sub(1)]
}

/// Expands `{path}`, `{parent}` and `{index}` placeholders in a capture-key
/// template against the current path.
pub fn format_capture_key(template: &str, path: &[PathSegment]) -> String {
    template
        .replace("{path}", &path_to_string(path))
        .replace("{parent}", &path_to_string(path_parent(path)))
        .replace("{index}", &path_index(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<PathSegment> {
        vec![
            PathSegment::Key("orders".into()),
            PathSegment::Index(2),
            PathSegment::Key("total".into()),
        ]
    }

    #[test]
    fn test_path_to_string_dotted() {
        assert_eq!(path_to_string(&sample()), "orders.2.total");
        assert_eq!(path_to_string(&[]), "");
    }

    #[test]
    fn test_parent_and_index() {
        let path = sample();
        assert_eq!(path_index(&path), "total");
        assert_eq!(path_to_string(path_parent(&path)), "orders.2");
        assert_eq!(path_index(&[]), "");
        assert_eq!(path_parent(&[]).len(), 0);
    }

    #[test]
    fn test_format_capture_key() {
        let path = sample();
        assert_eq!(format_capture_key("{path}", &path), "orders.2.total");
        assert_eq!(format_capture_key("{parent}#{index}", &path), "orders.2#total");
        assert_eq!(format_capture_key("plain", &path), "plain");
    }
}
