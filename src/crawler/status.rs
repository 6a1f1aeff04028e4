//! Progress events for whoever is watching the migration.
//!
//! Separated from UI concerns: the crawler emits [`StatusEvent`]s into a
//! [`StatusSink`]; the CLI renders them, tests record them.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

/// What a tab wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabWaitKind {
    NewTab,
    DownloadTabs,
}

/// Events emitted during a migration.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// Free-form stage message ("Logging into Replit...")
    Message(String),
    /// A folder was opened for scanning
    FolderEntered { path: String, locator: String },
    /// A folder link pointed at an already visited folder
    FolderSkipped { locator: String },
    /// A project link was missing metadata fields
    ProjectSkipped { locator: String, reason: String },
    /// A project archive download was fired
    DownloadTriggered {
        index: usize,
        total: usize,
        name: String,
    },
    /// Heartbeat while polling the tab list
    TabWait {
        kind: TabWaitKind,
        elapsed: Duration,
    },
    /// Download tabs were still open when the wait timed out
    DownloadsUnsettled { pending: usize, timeout: Duration },
    /// A folder tab was closed after its subtree finished
    FolderClosed { path: String },
    /// An archive is being moved and extracted
    Organizing {
        index: usize,
        total: usize,
        name: String,
    },
    /// The archive for a project never landed in the output directory
    MissingArchive { name: String, expected: PathBuf },
    /// The archive was found but could not be extracted
    ExtractFailed { name: String, error: String },
    /// The ignore pass finished
    IgnoredRemoved { files: usize, dirs: usize },
}

impl StatusEvent {
    /// Soft failures: reported, never fatal.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::ProjectSkipped { .. }
                | Self::DownloadsUnsettled { .. }
                | Self::MissingArchive { .. }
                | Self::ExtractFailed { .. }
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.write_str(msg),
            Self::FolderEntered { path, .. } => {
                let shown = if path.is_empty() { "/" } else { path.as_str() };
                write!(f, "Currently downloading folder: {}", shown)
            }
            Self::FolderSkipped { locator } => {
                write!(f, "Skipping already visited folder {}", locator)
            }
            Self::ProjectSkipped { locator, reason } => {
                write!(f, "Skipping project {}: {}", locator, reason)
            }
            Self::DownloadTriggered { index, total, name } => {
                write!(f, "\t({}/{}) Downloading project \"{}\"...", index, total, name)
            }
            Self::TabWait { kind, elapsed } => {
                let what = match kind {
                    TabWaitKind::NewTab => "folder tab to open",
                    TabWaitKind::DownloadTabs => "download tabs to close",
                };
                write!(f, "\tStill waiting for {} ({}s elapsed)", what, elapsed.as_secs())
            }
            Self::DownloadsUnsettled { pending, timeout } => write!(
                f,
                "\t{} download tab(s) still open after {}s; downloads may still be in progress",
                pending,
                timeout.as_secs()
            ),
            Self::FolderClosed { path } => {
                let shown = if path.is_empty() { "/" } else { path.as_str() };
                write!(f, "Finished folder: {}", shown)
            }
            Self::Organizing { index, total, name } => {
                write!(f, "({}/{}) Unzipping {}...", index, total, name)
            }
            Self::MissingArchive { name, expected } => write!(
                f,
                "Archive for \"{}\" not found at {}",
                name,
                expected.display()
            ),
            Self::ExtractFailed { name, error } => {
                write!(f, "Could not extract \"{}\": {}", name, error)
            }
            Self::IgnoredRemoved { files, dirs } => write!(
                f,
                "Deleted {} ignored file(s) and {} ignored director(ies)",
                files, dirs
            ),
        }
    }
}

/// Receives progress events. Must never block for long.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<T: StatusSink + ?Sized> StatusSink for Arc<T> {
    fn emit(&self, event: StatusEvent) {
        (**self).emit(event)
    }
}

impl StatusSink for mpsc::UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        // Receiver gone means nobody is watching anymore
        let _ = self.send(event);
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct StatusLog {
    events: Mutex<Vec<StatusEvent>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<StatusEvent> {
        self.events()
            .into_iter()
            .filter(StatusEvent::is_warning)
            .collect()
    }

    /// Rendered status lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(ToString::to_string).collect()
    }
}

impl StatusSink for StatusLog {
    fn emit(&self, event: StatusEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_line_matches_progress_format() {
        let event = StatusEvent::DownloadTriggered {
            index: 2,
            total: 5,
            name: "snake".to_string(),
        };
        assert_eq!(event.to_string(), "\t(2/5) Downloading project \"snake\"...");
        assert!(!event.is_warning());
    }

    #[test]
    fn test_status_log_separates_warnings() {
        let log = StatusLog::new();
        log.emit(StatusEvent::Message("Logging in...".to_string()));
        log.emit(StatusEvent::MissingArchive {
            name: "snake".to_string(),
            expected: PathBuf::from("/tmp/snake.zip"),
        });

        assert_eq!(log.events().len(), 2);
        assert_eq!(log.warnings().len(), 1);
        assert_eq!(log.lines()[0], "Logging in...");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.emit(StatusEvent::FolderClosed {
            path: String::new(),
        });
        drop(tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.to_string(), "Finished folder: /");
        assert!(rx.recv().await.is_none());
    }
}
