//! Recursive folder crawl and download orchestration.
//!
//! Entry point is [`FolderCrawler::crawl`]. Each folder visit runs
//! ENTER → OPEN_TAB → LOADED → SCAN → DOWNLOAD → RECURSE → CLOSE_TAB,
//! strictly sequentially over one browser session.

mod download;
mod folder;
mod status;
mod tabs;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::SessionError;

pub use download::{DownloadCoordinator, DownloadSummary};
pub use folder::{CrawlOutcome, FolderCrawler, FolderLayout};
pub use status::{StatusEvent, StatusLog, StatusSink, TabWaitKind};
pub use tabs::TabReconciler;

/// Errors that abort a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("timed out after {timeout:?} waiting for a new tab to open")]
    TabOpenTimeout { timeout: Duration },

    #[error("crawl cancelled")]
    Cancelled,
}

/// Timing knobs for the crawl. All waits are bounded by these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// How long to wait for a folder tab to appear.
    pub tab_open_timeout_secs: u64,
    /// How long to wait for a folder's download tabs to close.
    pub download_wait_timeout_secs: u64,
    /// Pause after a folder tab loads, for client-side rendering.
    pub settle_delay_ms: u64,
    /// Tab list polling interval.
    pub poll_interval_ms: u64,
    /// Interval between "still waiting" status lines.
    pub heartbeat_secs: u64,
    /// Extra attempts at opening a folder tab before giving up.
    pub tab_open_retries: u32,
    /// How long to wait for in-flight browser downloads before shutting the browser down.
    pub drain_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            tab_open_timeout_secs: 10,
            download_wait_timeout_secs: 10,
            settle_delay_ms: 3000,
            poll_interval_ms: 250,
            heartbeat_secs: 5,
            tab_open_retries: 1,
            drain_timeout_secs: 120,
        }
    }
}

impl CrawlConfig {
    pub fn tab_open_timeout(&self) -> Duration {
        Duration::from_secs(self.tab_open_timeout_secs)
    }

    pub fn download_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.download_wait_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
