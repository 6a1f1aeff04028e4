//! Archive download triggering.
//!
//! Downloads go through the browser's own download manager: each project
//! archive is opened in a transient tab that closes itself once the
//! download has been handed off. The only completion signal available
//! here is those tabs going away.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::status::{StatusEvent, StatusSink};
use super::tabs::TabReconciler;
use super::{CrawlConfig, CrawlError};
use crate::browser::{BrowserSession, TabHandle};
use crate::models::{ProjectRecord, ARCHIVE_EXTENSION};

/// Outcome of one [`DownloadCoordinator::download_all`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Downloads fired.
    pub triggered: usize,
    /// Whether every transient tab closed before the timeout.
    pub settled: bool,
}

/// Fires one archive download per project and waits for the tabs to settle.
#[derive(Clone)]
pub struct DownloadCoordinator {
    tabs: TabReconciler,
    wait_timeout: Duration,
    archive_ext: String,
    sink: Arc<dyn StatusSink>,
    cancel: CancellationToken,
}

impl DownloadCoordinator {
    pub fn new(
        config: &CrawlConfig,
        sink: Arc<dyn StatusSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tabs: TabReconciler::new(config, sink.clone()),
            wait_timeout: config.download_wait_timeout(),
            archive_ext: ARCHIVE_EXTENSION.to_string(),
            sink,
            cancel,
        }
    }

    /// Trigger a download for every project, in order, then wait for the
    /// transient tabs to close.
    ///
    /// A wait timeout is not an error: it comes back as `settled: false`.
    /// Calling this twice for one project downloads it twice.
    pub async fn download_all<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        projects: &[ProjectRecord],
    ) -> Result<DownloadSummary, CrawlError> {
        if self.cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        if projects.is_empty() {
            return Ok(DownloadSummary {
                triggered: 0,
                settled: true,
            });
        }

        let baseline: HashSet<TabHandle> = session.list_tabs().await?.into_iter().collect();
        let total = projects.len();

        for (i, project) in projects.iter().enumerate() {
            let url = project.archive_url(&self.archive_ext);
            self.sink.emit(StatusEvent::DownloadTriggered {
                index: i + 1,
                total,
                name: project.name.clone(),
            });
            info!("Downloading {} from {}", project.name, url);
            session.open_tab(&url).await?;
        }

        let settled = self
            .tabs
            .wait_for_tabs_to_close(session, &baseline, self.wait_timeout)
            .await?;

        if !settled {
            let pending = session
                .list_tabs()
                .await?
                .len()
                .saturating_sub(baseline.len());
            warn!(
                "{} download tab(s) still open after {:?}; continuing",
                pending, self.wait_timeout
            );
            self.sink.emit(StatusEvent::DownloadsUnsettled {
                pending,
                timeout: self.wait_timeout,
            });
        }

        Ok(DownloadSummary {
            triggered: total,
            settled,
        })
    }
}
