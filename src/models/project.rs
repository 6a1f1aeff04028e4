//! Discovered projects and the aggregate result of a crawl.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::folder::last_segment;

/// Extension of the archives the platform serves for a project.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// One discovered project. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Unique key within a crawl.
    pub name: String,
    /// Link the project was discovered under.
    pub locator: String,
    /// Path of the containing folder (see [`super::FolderRef`]).
    pub path: String,
    /// Platform relative-time text, e.g. "4 weeks ago".
    pub last_modified: String,
    /// Human-readable size text, e.g. "12.3 MB".
    pub size: String,
}

impl ProjectRecord {
    /// Build a record for a project link found in the folder at `path`.
    pub fn new(
        locator: impl Into<String>,
        path: impl Into<String>,
        last_modified: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        let locator = locator.into();
        Self {
            name: project_name(&locator).to_string(),
            locator,
            path: path.into(),
            last_modified: last_modified.into(),
            size: size.into(),
        }
    }

    /// Locator of the archive download for this project: the project locator
    /// without query or fragment, suffixed with `.{ext}`.
    pub fn archive_url(&self, ext: &str) -> String {
        let base = match Url::parse(&self.locator) {
            Ok(mut url) => {
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) => strip_query(&self.locator).to_string(),
        };
        format!("{}.{}", base.trim_end_matches('/'), ext)
    }

    /// File name of the archive once the browser has saved it.
    pub fn archive_file_name(&self, ext: &str) -> String {
        format!("{}.{}", self.name, ext)
    }
}

fn strip_query(locator: &str) -> &str {
    locator
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(locator)
}

fn project_name(locator: &str) -> &str {
    strip_query(last_segment(strip_query(locator).trim_end_matches('/')))
}

/// Everything a crawl discovered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Project name → record. A second discovery of a name overwrites.
    pub projects: BTreeMap<String, ProjectRecord>,
    /// Folder locators opened during the crawl, in visit order.
    pub visited: Vec<String>,
    /// Paths of folders whose download tabs were still open at timeout.
    pub unsettled: Vec<String>,
}

impl CrawlResult {
    /// Wrap an already-known project mapping (e.g. one read back from storage).
    pub fn from_projects(projects: BTreeMap<String, ProjectRecord>) -> Self {
        Self {
            projects,
            ..Default::default()
        }
    }

    /// Record a project, returning the record it replaced, if any.
    pub fn insert(&mut self, project: ProjectRecord) -> Option<ProjectRecord> {
        self.projects.insert(project.name.clone(), project)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ProjectRecord> {
        self.projects.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.projects.values()
    }
}

impl FromIterator<ProjectRecord> for CrawlResult {
    fn from_iter<I: IntoIterator<Item = ProjectRecord>>(iter: I) -> Self {
        let mut result = Self::default();
        for project in iter {
            result.insert(project);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_locator() {
        let p = ProjectRecord::new(
            "https://replit.com/@ada/snake-game?v=1",
            "games/",
            "2 days ago",
            "1.2 MB",
        );
        assert_eq!(p.name, "snake-game");
        assert_eq!(p.path, "games/");
    }

    #[test]
    fn test_archive_url_strips_query() {
        let p = ProjectRecord::new("https://replit.com/@ada/snake?v=1#top", "", "", "");
        assert_eq!(
            p.archive_url(ARCHIVE_EXTENSION),
            "https://replit.com/@ada/snake.zip"
        );
        assert_eq!(p.archive_file_name(ARCHIVE_EXTENSION), "snake.zip");
    }

    #[test]
    fn test_archive_url_for_relative_locator() {
        let p = ProjectRecord::new("/@ada/snake?tab=files", "", "", "");
        assert_eq!(p.archive_url("zip"), "/@ada/snake.zip");
    }

    #[test]
    fn test_second_discovery_overwrites() {
        let mut result = CrawlResult::default();
        assert!(result
            .insert(ProjectRecord::new("https://x/@a/p", "", "1 day ago", "1 KB"))
            .is_none());
        let old = result.insert(ProjectRecord::new("https://x/@a/p", "sub/", "now", "2 KB"));
        assert_eq!(old.map(|p| p.path), Some(String::new()));
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("p").map(|p| p.path.as_str()), Some("sub/"));
    }
}
