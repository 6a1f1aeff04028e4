//! Ignore rules for platform-generated files.
//!
//! The rules file has two sections, one entry per line:
//!
//! ```text
//! # generated by the platform
//! @(DIRECTORIES)
//! .cache
//! node_modules
//! @(FILES)
//! .replit
//! *.lock
//! ```
//!
//! Entries under `@(FILES)` starting with `*.` are extension rules.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::OrganizeError;

/// Default name of the rules file.
pub const DEFAULT_IGNORE_FILE: &str = "replit_ignore.txt";

const DIRECTORIES_MARKER: &str = "@(DIRECTORIES)";
const FILES_MARKER: &str = "@(FILES)";

#[derive(Clone, Copy)]
enum Section {
    Directories,
    Files,
}

/// Parsed ignore rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    pub dirs: HashSet<String>,
    pub files: HashSet<String>,
    pub extensions: HashSet<String>,
}

/// What an ignore pass deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreStats {
    pub files: usize,
    pub dirs: usize,
}

impl IgnoreRules {
    pub fn parse(contents: &str) -> Self {
        let mut rules = Self::default();
        let mut section = None;

        for line in contents.lines() {
            if line.starts_with('#') {
                continue;
            }
            if line.starts_with(DIRECTORIES_MARKER) {
                section = Some(Section::Directories);
                continue;
            }
            if line.starts_with(FILES_MARKER) {
                section = Some(Section::Files);
                continue;
            }

            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            match section {
                Some(Section::Directories) => {
                    rules.dirs.insert(entry.to_string());
                }
                Some(Section::Files) => match entry.strip_prefix("*.") {
                    Some(ext) => {
                        rules.extensions.insert(ext.to_string());
                    }
                    None => {
                        rules.files.insert(entry.to_string());
                    }
                },
                None => debug!("Ignore entry {:?} outside any section", entry),
            }
        }

        rules
    }

    /// Read rules from `path`. A missing file means no rules.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Ignore file {} not found; nothing will be pruned",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty() && self.extensions.is_empty()
    }

    pub fn matches_dir(&self, name: &str) -> bool {
        self.dirs.contains(name)
    }

    pub fn matches_file(&self, path: &Path) -> bool {
        let name_hit = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.files.contains(n));
        let ext_hit = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(e));
        name_hit || ext_hit
    }

    /// Delete every match below `root` (never `root` itself).
    ///
    /// Matched directories are removed whole and not descended into.
    /// Running this twice leaves the same tree as running it once.
    pub fn apply(&self, root: &Path) -> Result<IgnoreStats, OrganizeError> {
        let mut stats = IgnoreStats::default();
        if self.is_empty() || !root.exists() {
            return Ok(stats);
        }

        let mut walker = WalkDir::new(root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if entry.file_type().is_dir() {
                if self.matches_dir(&name) {
                    debug!("Removing ignored directory {}", path.display());
                    fs::remove_dir_all(path)?;
                    stats.dirs += 1;
                    walker.skip_current_dir();
                }
            } else if self.matches_file(path) {
                debug!("Removing ignored file {}", path.display());
                fs::remove_file(path)?;
                stats.files += 1;
            }
        }

        Ok(stats)
    }
}
