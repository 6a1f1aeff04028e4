//! Post-crawl organization of downloaded archives.
//!
//! Downloads land flat in the output directory as `{name}.zip`. Each one is
//! moved under `{output}/{path}/{name}/`, extracted there, and deleted. A
//! single ignore pass over the whole output tree runs at the end.

mod ignore;

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::crawler::{StatusEvent, StatusSink};
use crate::models::{CrawlResult, ProjectRecord, ARCHIVE_EXTENSION};

pub use ignore::{IgnoreRules, IgnoreStats, DEFAULT_IGNORE_FILE};

/// Suffix of partial downloads written by Chromium.
pub const PARTIAL_DOWNLOAD_EXTENSION: &str = "crdownload";

/// Failures of the output tree itself. These abort organization.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to walk output tree: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Per-project problems. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizeWarning {
    /// The archive download never landed.
    MissingArchive { name: String, expected: PathBuf },
    /// The archive is there but could not be unpacked. It is left in place.
    ExtractFailed { name: String, error: String },
}

impl From<OrganizeWarning> for StatusEvent {
    fn from(warning: OrganizeWarning) -> Self {
        match warning {
            OrganizeWarning::MissingArchive { name, expected } => {
                StatusEvent::MissingArchive { name, expected }
            }
            OrganizeWarning::ExtractFailed { name, error } => {
                StatusEvent::ExtractFailed { name, error }
            }
        }
    }
}

/// Outcome of [`FileOrganizer::organize`].
#[derive(Debug, Clone, Default)]
pub struct OrganizeReport {
    /// Names of projects extracted into place.
    pub organized: Vec<String>,
    pub warnings: Vec<OrganizeWarning>,
    pub ignored: IgnoreStats,
}

impl OrganizeReport {
    pub fn missing(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, OrganizeWarning::MissingArchive { .. }))
            .count()
    }
}

/// Moves, extracts and prunes downloaded project archives.
///
/// Blocking; run it under `spawn_blocking` from async code.
pub struct FileOrganizer {
    rules: IgnoreRules,
    archive_ext: String,
    sink: Arc<dyn StatusSink>,
}

impl FileOrganizer {
    pub fn new(rules: IgnoreRules, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            rules,
            archive_ext: ARCHIVE_EXTENSION.to_string(),
            sink,
        }
    }

    /// Organize every project in `results` under `output_root`.
    pub fn organize(
        &self,
        results: &CrawlResult,
        output_root: &Path,
    ) -> Result<OrganizeReport, OrganizeError> {
        fs::create_dir_all(output_root)?;
        let mut report = OrganizeReport::default();
        let total = results.len();

        for (i, project) in results.iter().enumerate() {
            self.sink.emit(StatusEvent::Organizing {
                index: i + 1,
                total,
                name: project.name.clone(),
            });

            match self.organize_project(project, output_root)? {
                None => report.organized.push(project.name.clone()),
                Some(warning) => {
                    warn!("{}", StatusEvent::from(warning.clone()));
                    self.sink.emit(warning.clone().into());
                    report.warnings.push(warning);
                }
            }
        }

        self.sink
            .emit(StatusEvent::Message("Deleting ignored files and directories...".into()));
        report.ignored = self.rules.apply(output_root)?;
        self.sink.emit(StatusEvent::IgnoredRemoved {
            files: report.ignored.files,
            dirs: report.ignored.dirs,
        });

        info!(
            "Organized {}/{} project(s) into {}",
            report.organized.len(),
            total,
            output_root.display()
        );
        Ok(report)
    }

    /// Where the flat download of `project` is expected.
    pub fn archive_path(&self, project: &ProjectRecord, output_root: &Path) -> PathBuf {
        output_root.join(project.archive_file_name(&self.archive_ext))
    }

    /// Directory a project is extracted into.
    pub fn destination(&self, project: &ProjectRecord, output_root: &Path) -> PathBuf {
        output_root
            .join(relative_path(&project.path))
            .join(relative_path(&project.name))
    }

    fn organize_project(
        &self,
        project: &ProjectRecord,
        output_root: &Path,
    ) -> Result<Option<OrganizeWarning>, OrganizeError> {
        let source = self.archive_path(project, output_root);
        if !source.is_file() {
            return Ok(Some(OrganizeWarning::MissingArchive {
                name: project.name.clone(),
                expected: source,
            }));
        }

        let dest = self.destination(project, output_root);
        let fresh_dest = !dest.exists();
        fs::create_dir_all(&dest)?;
        let moved = dest.join(project.archive_file_name(&self.archive_ext));
        fs::rename(&source, &moved)?;
        debug!("Moved {} to {}", source.display(), moved.display());

        match extract(&moved, &dest) {
            Ok(()) => {
                fs::remove_file(&moved)?;
                Ok(None)
            }
            Err(e) => {
                // Put it back so a later run can retry from a clean slate
                fs::rename(&moved, &source)?;
                if fresh_dest {
                    fs::remove_dir_all(&dest)?;
                }
                Ok(Some(OrganizeWarning::ExtractFailed {
                    name: project.name.clone(),
                    error: e.to_string(),
                }))
            }
        }
    }
}

fn extract(archive: &Path, dest: &Path) -> Result<(), OrganizeError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Normal components of `path` only; `..`, roots and prefixes are dropped.
fn relative_path(path: &str) -> PathBuf {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Number of unfinished browser downloads in `dir`.
pub fn pending_downloads(dir: &Path) -> io::Result<usize> {
    let mut pending = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path
            .extension()
            .is_some_and(|ext| ext == PARTIAL_DOWNLOAD_EXTENSION)
        {
            pending += 1;
        }
    }
    Ok(pending)
}
