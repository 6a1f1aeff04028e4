//! Data models for replmigrate.

mod folder;
mod project;

pub use folder::{last_segment, FolderRef};
pub use project::{CrawlResult, ProjectRecord, ARCHIVE_EXTENSION};
