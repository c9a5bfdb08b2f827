//! Path classification
//!
//! The filesystem is exactly one level deep. Every incoming path is
//! sorted into one of five classes before anything else happens, so
//! dotfiles and nested paths never reach the naming service.

use crate::synthetic::SyntheticFileTable;

/// Path of the mount root
pub const ROOT_PATH: &str = "/";

/// Names starting with this are never looked up
pub const HIDDEN_PREFIX: char = '.';

/// Classification of an incoming path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathClass<'a> {
    /// The mount root
    Root,
    /// A registered synthetic file (name without the leading slash)
    Synthetic(&'a str),
    /// A dotfile that is not a synthetic file
    Hidden(&'a str),
    /// A single-segment name that may name a locker
    Candidate(&'a str),
    /// Anything else: nested, relative, or empty-segment paths
    Invalid,
}

impl<'a> PathClass<'a> {
    /// Classify `path` against the synthetic files registered in `table`
    pub fn of(path: &'a str, table: &SyntheticFileTable) -> Self {
        if path == ROOT_PATH {
            return PathClass::Root;
        }
        let Some(rest) = path.strip_prefix('/') else {
            return PathClass::Invalid;
        };
        if table.contains(rest) {
            return PathClass::Synthetic(rest);
        }
        if rest.starts_with(HIDDEN_PREFIX) {
            return PathClass::Hidden(rest);
        }
        if rest.is_empty() || rest.contains('/') {
            return PathClass::Invalid;
        }
        PathClass::Candidate(rest)
    }

    /// Name a link may be created at or removed from
    ///
    /// Only the root, synthetic files and multi-segment paths are off
    /// limits; dotfile names are accepted here even though lookups skip them.
    pub fn link_name(&self) -> Option<&'a str> {
        match *self {
            PathClass::Candidate(name) => Some(name),
            PathClass::Hidden(name) if is_valid_segment(name) => Some(name),
            _ => None,
        }
    }
}

/// Whether `name` is usable as a single directory entry
#[inline]
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Join a single-segment name onto the root
#[inline]
pub fn root_child(name: &str) -> String {
    format!("/{}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticContent;

    fn table() -> SyntheticFileTable {
        let mut table = SyntheticFileTable::new();
        table
            .register(".attachtab", SyntheticContent::fixed(b"".to_vec()))
            .unwrap();
        table
            .register("README.txt", SyntheticContent::fixed(b"hi\n".to_vec()))
            .unwrap();
        table
    }

    #[test]
    fn test_root() {
        assert_eq!(PathClass::of("/", &table()), PathClass::Root);
    }

    #[test]
    fn test_synthetic_beats_hidden() {
        let t = table();
        assert_eq!(PathClass::of("/.attachtab", &t), PathClass::Synthetic(".attachtab"));
        assert_eq!(PathClass::of("/README.txt", &t), PathClass::Synthetic("README.txt"));
    }

    #[test]
    fn test_hidden() {
        let t = table();
        assert_eq!(PathClass::of("/.Trash", &t), PathClass::Hidden(".Trash"));
        assert_eq!(PathClass::of("/.", &t), PathClass::Hidden("."));
    }

    #[test]
    fn test_candidate_and_invalid() {
        let t = table();
        assert_eq!(PathClass::of("/sipb", &t), PathClass::Candidate("sipb"));
        assert_eq!(PathClass::of("/sipb/bin", &t), PathClass::Invalid);
        assert_eq!(PathClass::of("/sipb/", &t), PathClass::Invalid);
        assert_eq!(PathClass::of("sipb", &t), PathClass::Invalid);
        assert_eq!(PathClass::of("", &t), PathClass::Invalid);
        assert_eq!(PathClass::of("//", &t), PathClass::Invalid);
    }

    #[test]
    fn test_link_name() {
        let t = table();
        assert_eq!(PathClass::of("/sipb", &t).link_name(), Some("sipb"));
        assert_eq!(PathClass::of("/.hidden", &t).link_name(), Some(".hidden"));
        assert_eq!(PathClass::of("/", &t).link_name(), None);
        assert_eq!(PathClass::of("/.attachtab", &t).link_name(), None);
        assert_eq!(PathClass::of("/a/b", &t).link_name(), None);
        assert_eq!(PathClass::of("/..", &t).link_name(), None);
        assert_eq!(PathClass::of("/.cache/x", &t).link_name(), None);
    }

    #[test]
    fn test_valid_segment() {
        assert!(is_valid_segment("README.txt"));
        assert!(is_valid_segment(".attachtab"));
        assert!(!is_valid_segment(""));
        assert!(!is_valid_segment("."));
        assert!(!is_valid_segment(".."));
        assert!(!is_valid_segment("a/b"));
        assert_eq!(root_child("sipb"), "/sipb");
    }
}
