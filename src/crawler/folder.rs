//! Recursive folder traversal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::download::DownloadCoordinator;
use super::status::{StatusEvent, StatusSink};
use super::tabs::TabReconciler;
use super::{CrawlConfig, CrawlError};
use crate::browser::{BrowserSession, LinkElement, LinkQuery, TabHandle};
use crate::models::{CrawlResult, FolderRef, ProjectRecord};

/// Where projects and subfolders live on a folder page.
///
/// This is the site-specific half of the crawl: which anchors are projects,
/// which are folders, and how to read a project's metadata from its anchor.
pub trait FolderLayout: Send + Sync {
    /// Anchors that are projects, with the metadata fields to read.
    fn project_query(&self) -> LinkQuery;

    /// Anchors that are subfolders.
    fn folder_query(&self) -> LinkQuery;

    /// Turn a project anchor into a record, or explain why it is malformed.
    fn parse_project(&self, link: &LinkElement, folder: &FolderRef)
        -> Result<ProjectRecord, String>;
}

/// What a crawl found, and the error that stopped it early, if any.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub result: CrawlResult,
    pub error: Option<CrawlError>,
}

impl CrawlOutcome {
    pub fn into_result(self) -> Result<CrawlResult, CrawlError> {
        match self.error {
            None => Ok(self.result),
            Some(e) => Err(e),
        }
    }
}

#[derive(Default)]
struct CrawlState {
    visited: HashSet<String>,
    result: CrawlResult,
}

/// Walks a remote folder tree depth-first over a single browser session.
pub struct FolderCrawler {
    layout: Arc<dyn FolderLayout>,
    tabs: TabReconciler,
    downloads: DownloadCoordinator,
    sink: Arc<dyn StatusSink>,
    cancel: CancellationToken,
    tab_open_timeout: Duration,
    tab_open_retries: u32,
    settle_delay: Duration,
}

impl FolderCrawler {
    pub fn new(
        layout: Arc<dyn FolderLayout>,
        config: &CrawlConfig,
        sink: Arc<dyn StatusSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            layout,
            tabs: TabReconciler::new(config, sink.clone()),
            downloads: DownloadCoordinator::new(config, sink.clone(), cancel.clone()),
            sink,
            cancel,
            tab_open_timeout: config.tab_open_timeout(),
            tab_open_retries: config.tab_open_retries,
            settle_delay: config.settle_delay(),
        }
    }

    /// Crawl everything reachable from `root`, downloading as it goes.
    pub async fn crawl<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        root: FolderRef,
    ) -> Result<CrawlResult, CrawlError> {
        self.crawl_partial(session, root).await.into_result()
    }

    /// Like [`crawl`](Self::crawl), but a fatal error still hands back
    /// everything found and downloaded before it.
    pub async fn crawl_partial<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        root: FolderRef,
    ) -> CrawlOutcome {
        let mut state = CrawlState::default();
        let error = self.visit(session, root, &mut state).await.err();
        match &error {
            None => info!(
                "Crawl finished: {} folder(s), {} project(s)",
                state.result.visited.len(),
                state.result.len()
            ),
            Some(e) => warn!(
                "Crawl stopped after {} folder(s), {} project(s): {}",
                state.result.visited.len(),
                state.result.len(),
                e
            ),
        }
        CrawlOutcome {
            result: state.result,
            error,
        }
    }

    fn visit<'a, S: BrowserSession + ?Sized>(
        &'a self,
        session: &'a mut S,
        folder: FolderRef,
        state: &'a mut CrawlState,
    ) -> BoxFuture<'a, Result<(), CrawlError>> {
        Box::pin(async move {
            // ENTER
            if state.visited.contains(&folder.locator) {
                debug!("Already visited {}", folder.locator);
                self.sink.emit(StatusEvent::FolderSkipped {
                    locator: folder.locator.clone(),
                });
                return Ok(());
            }
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            state.visited.insert(folder.locator.clone());
            state.result.visited.push(folder.locator.clone());
            info!("Entering folder {} ({})", folder.display_path(), folder.locator);
            self.sink.emit(StatusEvent::FolderEntered {
                path: folder.path.clone(),
                locator: folder.locator.clone(),
            });

            // OPEN_TAB → LOADED
            let handle = self.open_folder_tab(session, &folder.locator).await?;
            session.switch_to(&handle).await?;
            tokio::time::sleep(self.settle_delay).await;

            // SCAN
            let projects = self.scan_projects(session, &folder).await?;
            let subfolders: Vec<FolderRef> = session
                .find_links(&self.layout.folder_query())
                .await?
                .into_iter()
                .map(|link| folder.child(link.href))
                .collect();
            debug!(
                "{}: {} project(s), {} subfolder(s)",
                folder.display_path(),
                projects.len(),
                subfolders.len()
            );

            // DOWNLOAD, once per name for the whole crawl
            let mut fresh = Vec::with_capacity(projects.len());
            for project in projects {
                match state.result.insert(project.clone()) {
                    Some(previous) => warn!(
                        "Project {} seen again under {:?} (was {:?}), not downloading again",
                        project.name, project.path, previous.path
                    ),
                    None => fresh.push(project),
                }
            }
            let summary = self.downloads.download_all(session, &fresh).await?;
            if !summary.settled {
                state.result.unsettled.push(folder.path.clone());
            }

            // RECURSE
            for child in subfolders {
                self.visit(session, child, state).await?;
            }

            // CLOSE_TAB
            session.switch_to(&handle).await?;
            session.close(&handle).await?;
            if let Some(last) = session.list_tabs().await?.last() {
                session.switch_to(last).await?;
            }
            self.sink.emit(StatusEvent::FolderClosed {
                path: folder.path.clone(),
            });

            Ok(())
        })
    }

    /// Fire the open action and wait for the tab, retrying on timeout.
    async fn open_folder_tab<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        url: &str,
    ) -> Result<TabHandle, CrawlError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let before: HashSet<TabHandle> = session.list_tabs().await?.into_iter().collect();
            session.open_tab(url).await?;

            match self
                .tabs
                .wait_for_new_tab(session, &before, self.tab_open_timeout)
                .await
            {
                Ok(handle) => return Ok(handle),
                Err(CrawlError::TabOpenTimeout { .. }) if attempt <= self.tab_open_retries => {
                    warn!("Tab for {} did not open (attempt {}), retrying", url, attempt);
                    self.sink.emit(StatusEvent::Message(format!(
                        "Folder tab did not open, retrying ({}/{})...",
                        attempt, self.tab_open_retries
                    )));
                }
                Err(e) => {
                    error!("Could not open tab for {}: {}", url, e);
                    return Err(e);
                }
            }
        }
    }

    async fn scan_projects<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        folder: &FolderRef,
    ) -> Result<Vec<ProjectRecord>, CrawlError> {
        let links = session.find_links(&self.layout.project_query()).await?;
        let mut projects = Vec::with_capacity(links.len());

        for link in &links {
            match self.layout.parse_project(link, folder) {
                Ok(project) => projects.push(project),
                Err(reason) => {
                    warn!("Skipping malformed project {}: {}", link.href, reason);
                    self.sink.emit(StatusEvent::ProjectSkipped {
                        locator: link.href.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(projects)
    }
}
