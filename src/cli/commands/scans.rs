//! Listing of stored scans and their projects.

use console::style;

use crate::config::Settings;
use crate::repository::{AsyncSqlitePool, ProjectRepository};

use crate::cli::helpers::truncate;

async fn open_repository(settings: &Settings) -> anyhow::Result<Option<ProjectRepository>> {
    if settings.database_url.is_none() && !settings.database_path().exists() {
        println!(
            "{} No scans yet. Run 'replmigrate migrate' first.",
            style("!").yellow()
        );
        return Ok(None);
    }
    let repo = ProjectRepository::new(AsyncSqlitePool::new(&settings.database_url()));
    repo.init_schema().await?;
    Ok(Some(repo))
}

/// List stored scans, newest first.
pub async fn cmd_scans(settings: &Settings) -> anyhow::Result<()> {
    let Some(repo) = open_repository(settings).await? else {
        return Ok(());
    };
    let migrations = repo.list_migrations().await?;

    if migrations.is_empty() {
        println!(
            "{} No scans yet. Run 'replmigrate migrate' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Stored scans").bold());
    println!("{}", "-".repeat(40));
    println!("{:<6} {:<22} Projects", "ID", "Created");
    println!("{}", "-".repeat(40));

    for migration in migrations {
        let count = repo.count_projects(migration.id).await?;
        println!(
            "{:<6} {:<22} {}",
            migration.id, migration.created_at, count
        );
    }

    Ok(())
}

/// List the projects of a scan, optionally filtered by name.
pub async fn cmd_projects(
    settings: &Settings,
    migration_id: Option<i32>,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let Some(repo) = open_repository(settings).await? else {
        return Ok(());
    };

    let migration = match migration_id {
        Some(id) => repo.get_migration(id).await?,
        None => repo.latest_migration().await?,
    };
    let Some(migration) = migration else {
        println!("{} Scan not found", style("✗").red());
        return Ok(());
    };

    let projects = repo
        .search_projects(Some(migration.id), name.unwrap_or_default())
        .await?;

    println!(
        "\n{} {}",
        style(format!("Scan #{}", migration.id)).bold(),
        style(&migration.created_at).dim()
    );
    println!("{}", "-".repeat(80));
    println!(
        "{:<28} {:<24} {:<16} Size",
        "Name", "Folder", "Last modified"
    );
    println!("{}", "-".repeat(80));

    for project in &projects {
        let folder = if project.path.is_empty() {
            "/"
        } else {
            project.path.as_str()
        };
        println!(
            "{:<28} {:<24} {:<16} {}",
            truncate(&project.name, 27),
            truncate(folder, 23),
            truncate(&project.last_modified, 15),
            project.size
        );
    }

    println!("{}", "-".repeat(80));
    println!("{} project(s)", projects.len());
    Ok(())
}
