//! Migration service.
//!
//! Runs a whole migration over one browser session: log in, crawl and
//! download, wait for the browser to finish writing files, shut the browser
//! down, organize the output tree, and record the generation.
//! Separated from UI concerns - progress goes to a [`StatusSink`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::crawler::{
    CrawlConfig, CrawlOutcome, DownloadCoordinator, FolderCrawler, StatusEvent, StatusSink,
};
use crate::models::CrawlResult;
use crate::organize::{pending_downloads, FileOrganizer, IgnoreRules, OrganizeReport};
use crate::repository::{now_timestamp, ProjectRepository};
use crate::site::{self, Credentials, LayoutConfig, LoginPrompt, ReplitLayout};

/// Result of a finished migration or re-download.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Generation the projects are stored under.
    pub migration_id: i32,
    pub crawl: CrawlResult,
    pub report: OrganizeReport,
}

/// Drives migrations end to end.
pub struct MigrationService {
    repo: ProjectRepository,
    output_dir: PathBuf,
    ignore_file: PathBuf,
    crawl: CrawlConfig,
    layout: LayoutConfig,
    sink: Arc<dyn StatusSink>,
    cancel: CancellationToken,
}

impl MigrationService {
    pub fn new(
        repo: ProjectRepository,
        settings: &Settings,
        sink: Arc<dyn StatusSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            repo,
            output_dir: settings.output_dir.clone(),
            ignore_file: settings.ignore_file.clone(),
            crawl: settings.crawl.clone(),
            layout: settings.layout.clone(),
            sink,
            cancel,
        }
    }

    /// Crawl every project of `credentials.username`, organize the
    /// downloads, and store the result as a new generation.
    ///
    /// The session is shut down before organizing, whether or not the
    /// crawl succeeded. When the crawl stops early, whatever it found is
    /// still organized and stored before the error is returned.
    pub async fn migrate<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        credentials: &Credentials,
        prompt: &dyn LoginPrompt,
    ) -> anyhow::Result<MigrationOutcome> {
        let rules = self.prepare()?;

        let crawled = self.crawl_phase(session, credentials, prompt).await;
        self.shutdown(session).await;
        let CrawlOutcome { result, error } = crawled?;

        let Some(error) = error else {
            return self.store(result, rules).await;
        };
        if result.is_empty() {
            return Err(anyhow::Error::new(error).context("Crawl failed"));
        }

        self.sink.emit(StatusEvent::Message(format!(
            "Crawl stopped early; keeping the {} project(s) found so far...",
            result.len()
        )));
        let saved = self.store(result, rules).await?;
        Err(anyhow::Error::new(error).context(format!(
            "Crawl failed; {} project(s) found before the failure were saved as scan #{}",
            saved.crawl.len(),
            saved.migration_id
        )))
    }

    /// Organize a crawl's downloads and record it as a new generation.
    async fn store(
        &self,
        crawl: CrawlResult,
        rules: IgnoreRules,
    ) -> anyhow::Result<MigrationOutcome> {
        let (crawl, report) = self.organize_blocking(crawl, rules).await?;

        self.sink
            .emit(StatusEvent::Message("Saving migration data...".into()));
        self.repo
            .init_schema()
            .await
            .context("Failed to initialize database")?;
        let migration_id = self
            .repo
            .create_migration(&now_timestamp())
            .await
            .context("Failed to create migration record")?;
        self.repo
            .write_projects(migration_id, &crawl.projects)
            .await
            .context("Failed to save projects")?;
        info!(
            "Migration {} saved with {} project(s)",
            migration_id,
            crawl.len()
        );

        Ok(MigrationOutcome {
            migration_id,
            crawl,
            report,
        })
    }

    /// Download the projects of a stored generation again, without scanning.
    pub async fn redownload<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        migration_id: i32,
        credentials: &Credentials,
        prompt: &dyn LoginPrompt,
    ) -> anyhow::Result<MigrationOutcome> {
        let crawl = self.stored_projects(Some(migration_id)).await?;
        let rules = self.prepare()?;

        let downloaded = self
            .download_phase(session, &crawl, credentials, prompt)
            .await;
        self.shutdown(session).await;
        downloaded?;

        let (crawl, report) = self.organize_blocking(crawl, rules).await?;
        Ok(MigrationOutcome {
            migration_id,
            crawl,
            report,
        })
    }

    /// Organize already downloaded archives of a stored generation
    /// (the newest when `migration_id` is `None`).
    pub async fn organize_stored(
        &self,
        migration_id: Option<i32>,
    ) -> anyhow::Result<OrganizeReport> {
        let crawl = self.stored_projects(migration_id).await?;
        let rules = self.prepare()?;
        let (_, report) = self.organize_blocking(crawl, rules).await?;
        Ok(report)
    }

    fn prepare(&self) -> anyhow::Result<IgnoreRules> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;
        IgnoreRules::load(&self.ignore_file).with_context(|| {
            format!("Failed to read ignore file {}", self.ignore_file.display())
        })
    }

    async fn stored_projects(&self, migration_id: Option<i32>) -> anyhow::Result<CrawlResult> {
        self.repo
            .init_schema()
            .await
            .context("Failed to initialize database")?;
        if let Some(id) = migration_id {
            if self.repo.get_migration(id).await?.is_none() {
                bail!("No migration with id {}", id);
            }
        }
        let projects = self
            .repo
            .read_projects(migration_id)
            .await
            .context("Failed to read stored projects")?;
        if projects.is_empty() {
            bail!("No stored projects to work on");
        }
        Ok(CrawlResult::from_projects(projects))
    }

    async fn login<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        credentials: &Credentials,
        prompt: &dyn LoginPrompt,
    ) -> anyhow::Result<()> {
        self.sink
            .emit(StatusEvent::Message("Logging into Replit...".into()));
        site::login(session, credentials, prompt)
            .await
            .context("Login failed")
    }

    async fn crawl_phase<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        credentials: &Credentials,
        prompt: &dyn LoginPrompt,
    ) -> anyhow::Result<CrawlOutcome> {
        self.login(session, credentials, prompt).await?;

        self.sink
            .emit(StatusEvent::Message("Scraping projects...".into()));
        let layout = Arc::new(ReplitLayout::new(
            credentials.username.clone(),
            self.layout.clone(),
        ));
        let crawler = FolderCrawler::new(layout, &self.crawl, self.sink.clone(), self.cancel.clone());
        let outcome = crawler
            .crawl_partial(session, site::root_folder(&credentials.username))
            .await;

        // Archives fired before a failure are still worth waiting for
        self.drain_downloads().await?;
        Ok(outcome)
    }

    async fn download_phase<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        crawl: &CrawlResult,
        credentials: &Credentials,
        prompt: &dyn LoginPrompt,
    ) -> anyhow::Result<()> {
        self.login(session, credentials, prompt).await?;

        let projects: Vec<_> = crawl.iter().cloned().collect();
        let downloads =
            DownloadCoordinator::new(&self.crawl, self.sink.clone(), self.cancel.clone());
        downloads
            .download_all(session, &projects)
            .await
            .context("Download failed")?;

        self.drain_downloads().await
    }

    /// Wait until the browser has no partial downloads left in the output
    /// directory, or the drain timeout passes.
    async fn drain_downloads(&self) -> anyhow::Result<()> {
        let timeout = self.crawl.drain_timeout();
        let poll = self.crawl.poll_interval().max(Duration::from_millis(500));
        let start = Instant::now();
        let mut announced = false;

        loop {
            let pending = pending_downloads(&self.output_dir)?;
            if pending == 0 {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                warn!(
                    "{} download(s) still in progress after {:?}",
                    pending, timeout
                );
                self.sink.emit(StatusEvent::Message(format!(
                    "{} download(s) did not finish; they will be reported as missing",
                    pending
                )));
                return Ok(());
            }
            if !announced {
                self.sink.emit(StatusEvent::Message(format!(
                    "Waiting for {} download(s) to finish...",
                    pending
                )));
                announced = true;
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn shutdown<S: BrowserSession + ?Sized>(&self, session: &mut S) {
        if let Err(e) = session.quit().await {
            warn!("Failed to shut down browser: {}", e);
        }
    }

    async fn organize_blocking(
        &self,
        crawl: CrawlResult,
        rules: IgnoreRules,
    ) -> anyhow::Result<(CrawlResult, OrganizeReport)> {
        self.sink
            .emit(StatusEvent::Message("Organizing files...".into()));
        let organizer = FileOrganizer::new(rules, self.sink.clone());
        let output = self.output_dir.clone();

        let (crawl, report) = tokio::task::spawn_blocking(move || {
            let report = organizer.organize(&crawl, &output);
            (crawl, report)
        })
        .await
        .context("Organizer task panicked")?;

        let report = report.context("Failed to organize output directory")?;
        Ok((crawl, report))
    }
}
