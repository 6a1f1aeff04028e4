//! Re-run organization for a stored scan.

use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::progress::spawn_renderer;
use crate::config::Settings;
use crate::crawler::StatusEvent;
use crate::repository::{AsyncSqlitePool, ProjectRepository};
use crate::services::MigrationService;

/// Move, extract and prune archives already sitting in the output directory.
pub async fn cmd_organize(settings: &Settings, migration_id: Option<i32>) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let (tx, rx) = mpsc::unbounded_channel::<StatusEvent>();
    let renderer = spawn_renderer(rx);

    let service = MigrationService::new(
        ProjectRepository::new(AsyncSqlitePool::new(&settings.database_url())),
        settings,
        Arc::new(tx),
        CancellationToken::new(),
    );
    let result = service.organize_stored(migration_id).await;
    drop(service);
    let summary = renderer.await.unwrap_or_default();

    let report = result?;
    println!();
    println!(
        "{} Organized {} project(s) into {}",
        style("✓").green(),
        report.organized.len(),
        settings.output_dir.display()
    );
    if report.missing() > 0 {
        println!(
            "  {} {} archive(s) missing",
            style("!").yellow(),
            report.missing()
        );
    }
    if summary.warnings > 0 {
        println!("  Warnings: {}", summary.warnings);
    }
    Ok(())
}
