//! Migration commands: full crawl and re-download of a stored scan.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use console::style;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::progress::{spawn_renderer, RenderSummary};
use crate::config::Settings;
use crate::crawler::{StatusEvent, StatusSink};
use crate::repository::{AsyncSqlitePool, ProjectRepository};
use crate::services::{MigrationOutcome, MigrationService};
use crate::site::{Credentials, LoginPrompt, NoPrompt};

/// Waits for the user to press Enter once they are through the CAPTCHA.
///
/// Gives up as soon as the run is cancelled.
struct StdinPrompt {
    cancel: CancellationToken,
}

#[async_trait]
impl LoginPrompt for StdinPrompt {
    async fn wait_for_user(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        println!(
            "{} Complete the login in the browser window (solve the CAPTCHA if shown), then press Enter...",
            style("?").yellow()
        );

        // A detached thread, so an unanswered read never holds up shutdown
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = tx.send(std::io::stdin().read_line(&mut line));
        });

        tokio::select! {
            read = rx => {
                if !matches!(read, Ok(Ok(_))) {
                    tracing::warn!("Could not read confirmation from stdin; continuing");
                }
            }
            _ = self.cancel.cancelled() => {
                tracing::debug!("Login prompt abandoned after cancellation");
            }
        }
    }
}

fn login_prompt(interactive: bool, cancel: &CancellationToken) -> Box<dyn LoginPrompt> {
    if interactive {
        Box::new(StdinPrompt {
            cancel: cancel.clone(),
        })
    } else {
        Box::new(NoPrompt)
    }
}

/// Status channel, renderer task, and a cancellation token wired to Ctrl-C.
struct Ui {
    sink: Arc<dyn StatusSink>,
    renderer: JoinHandle<RenderSummary>,
    cancel: CancellationToken,
    ctrl_c: JoinHandle<()>,
}

impl Ui {
    fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<StatusEvent>();
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            eprintln!(
                "\n{} Interrupted; stopping after the current step (Ctrl-C again to quit now)...",
                style("!").yellow()
            );
            token.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} Aborted", style("!").red());
                std::process::exit(130);
            }
        });

        Self {
            sink: Arc::new(tx),
            renderer: spawn_renderer(rx),
            cancel,
            ctrl_c,
        }
    }

    /// Wait for the renderer to drain. Every sink clone must be gone by now.
    async fn finish(self) -> RenderSummary {
        self.ctrl_c.abort();
        drop(self.sink);
        self.renderer.await.unwrap_or_default()
    }
}

fn repository(settings: &Settings) -> ProjectRepository {
    ProjectRepository::new(AsyncSqlitePool::new(&settings.database_url()))
}

/// Log in, crawl, download, organize and record a new scan.
pub async fn cmd_migrate(
    settings: &Settings,
    credentials: &Credentials,
    interactive: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let ui = Ui::start();
    let mut session = browser::launch(settings).await?;

    let service = MigrationService::new(
        repository(settings),
        settings,
        ui.sink.clone(),
        ui.cancel.clone(),
    );
    let credentials = credentials.clone();
    let prompt = login_prompt(interactive, &ui.cancel);

    let task = tokio::spawn(async move {
        service
            .migrate(session.as_mut(), &credentials, prompt.as_ref())
            .await
    });
    let outcome = task.await.context("Migration task panicked")?;
    let summary = ui.finish().await;

    let outcome = outcome?;
    print_outcome("Migration", &outcome, &summary, settings);
    Ok(())
}

/// Re-download a stored scan without crawling.
pub async fn cmd_redownload(
    settings: &Settings,
    migration_id: i32,
    credentials: &Credentials,
    interactive: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let ui = Ui::start();
    let mut session = browser::launch(settings).await?;

    let service = MigrationService::new(
        repository(settings),
        settings,
        ui.sink.clone(),
        ui.cancel.clone(),
    );
    let credentials = credentials.clone();
    let prompt = login_prompt(interactive, &ui.cancel);

    let task = tokio::spawn(async move {
        service
            .redownload(session.as_mut(), migration_id, &credentials, prompt.as_ref())
            .await
    });
    let outcome = task.await.context("Download task panicked")?;
    let summary = ui.finish().await;

    let outcome = outcome?;
    print_outcome("Download", &outcome, &summary, settings);
    Ok(())
}

fn print_outcome(
    what: &str,
    outcome: &MigrationOutcome,
    summary: &RenderSummary,
    settings: &Settings,
) {
    println!();
    println!(
        "{} {} complete (scan #{})",
        style("✓").green(),
        what,
        outcome.migration_id
    );
    println!("  Projects found:     {}", outcome.crawl.len());
    println!("  Folders visited:    {}", outcome.crawl.visited.len());
    println!("  Downloads started:  {}", summary.downloads);
    println!("  Organized:          {}", outcome.report.organized.len());
    if outcome.report.missing() > 0 {
        println!(
            "  {} {} archive(s) missing",
            style("!").yellow(),
            outcome.report.missing()
        );
    }
    if !outcome.crawl.unsettled.is_empty() {
        println!(
            "  {} downloads may not have finished in: {}",
            style("!").yellow(),
            outcome.crawl.unsettled.join(", ")
        );
    }
    if summary.warnings > 0 {
        println!("  Warnings:           {}", summary.warnings);
    }
    println!("  Output:             {}", settings.output_dir.display());
}

#[cfg(feature = "browser")]
mod browser {
    use anyhow::Context;

    use crate::browser::{BrowserSession, ChromiumSession};
    use crate::config::Settings;

    pub async fn launch(settings: &Settings) -> anyhow::Result<Box<dyn BrowserSession>> {
        let session = ChromiumSession::launch(&settings.browser, &settings.output_dir)
            .await
            .context("Failed to start browser")?;
        Ok(Box::new(session))
    }
}

#[cfg(not(feature = "browser"))]
mod browser {
    use crate::browser::BrowserSession;
    use crate::config::Settings;

    pub async fn launch(_settings: &Settings) -> anyhow::Result<Box<dyn BrowserSession>> {
        anyhow::bail!("replmigrate was built without the `browser` feature")
    }
}
