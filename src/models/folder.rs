//! Remote folder references.

use serde::{Deserialize, Serialize};

/// Separator appended after every folder name in a logical path.
pub const PATH_SEPARATOR: char = '/';

/// A remote folder: where it lives and where it sits in the hierarchy.
///
/// The path is empty for the root folder, otherwise a sequence of folder
/// names each terminated by `/` (e.g. `"games/2023/"`). It is derived purely
/// from the traversal, so one locator always maps to one path within a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderRef {
    pub locator: String,
    pub path: String,
}

impl FolderRef {
    /// The root of a crawl.
    pub fn root(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            path: String::new(),
        }
    }

    /// Reference to a subfolder discovered inside this folder.
    pub fn child(&self, locator: impl Into<String>) -> Self {
        let locator = locator.into();
        let mut path = self.path.clone();
        path.push_str(last_segment(&locator));
        path.push(PATH_SEPARATOR);
        Self { locator, path }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Human-readable label used in progress output.
    pub fn display_path(&self) -> &str {
        if self.is_root() {
            "/"
        } else {
            &self.path
        }
    }
}

/// Last `/`-separated segment of a locator, kept verbatim.
pub fn last_segment(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_paths_accumulate() {
        let root = FolderRef::root("https://replit.com/@ada");
        assert!(root.is_root());
        assert_eq!(root.display_path(), "/");

        let sub = root.child("https://replit.com/@ada?path=folder/games");
        assert_eq!(sub.path, "games/");

        let nested = sub.child("https://replit.com/@ada?path=folder/games/2023");
        assert_eq!(nested.path, "games/2023/");
        assert_eq!(nested.display_path(), "games/2023/");
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(last_segment("https://replit.com/@ada/snake"), "snake");
        assert_eq!(last_segment("no-slashes"), "no-slashes");
        assert_eq!(last_segment("trailing/"), "");
    }
}
