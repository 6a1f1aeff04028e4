//! Persistence of crawl generations and their projects.

use std::collections::BTreeMap;

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::models::{MigrationRecord, NewMigration, NewProject, ProjectRow};
use super::pool::{AsyncSqlitePool, DieselError};
use crate::models::ProjectRecord;
use crate::schema::{migrations, projects};

/// DDL for the tables in [`crate::schema`].
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    migration_id INTEGER NOT NULL REFERENCES migrations(id),
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    link TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    size TEXT NOT NULL,
    UNIQUE(migration_id, name)
);
CREATE INDEX IF NOT EXISTS idx_projects_migration ON projects(migration_id);
"#;

/// Stores each crawl as a generation of project rows.
#[derive(Clone)]
pub struct ProjectRepository {
    pool: AsyncSqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Create the tables if they are missing.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await
    }

    /// Start a new generation and return its id.
    pub async fn create_migration(&self, created_at: &str) -> Result<i32, DieselError> {
        let mut conn = self.pool.get().await?;

        // The insert holds the write lock until commit, so the newest id is ours
        let id = conn
            .transaction(|conn| {
                Box::pin(async move {
                    diesel::insert_into(migrations::table)
                        .values(NewMigration { created_at })
                        .execute(conn)
                        .await?;

                    migrations::table
                        .select(migrations::id)
                        .order(migrations::id.desc())
                        .first::<i32>(conn)
                        .await
                })
            })
            .await?;
        debug!("Created migration {} at {}", id, created_at);
        Ok(id)
    }

    /// Replace the projects stored for `migration_id`.
    pub async fn write_projects(
        &self,
        migration_id: i32,
        projects: &BTreeMap<String, ProjectRecord>,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;

        conn.transaction(|conn| {
            Box::pin(async move {
                diesel::delete(projects::table.filter(projects::migration_id.eq(migration_id)))
                    .execute(conn)
                    .await?;

                let mut written = 0;
                for record in projects.values() {
                    written += diesel::insert_into(projects::table)
                        .values(&NewProject::from_record(migration_id, record))
                        .execute(conn)
                        .await?;
                }
                Ok(written)
            })
        })
        .await
    }

    /// Projects of a generation; `None` reads the newest one.
    ///
    /// An empty map means there is no such generation or it had no projects.
    pub async fn read_projects(
        &self,
        migration_id: Option<i32>,
    ) -> Result<BTreeMap<String, ProjectRecord>, DieselError> {
        let Some(id) = self.resolve(migration_id).await? else {
            return Ok(BTreeMap::new());
        };
        let mut conn = self.pool.get().await?;

        let rows = projects::table
            .filter(projects::migration_id.eq(id))
            .select(ProjectRow::as_select())
            .load::<ProjectRow>(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.name.clone(), ProjectRecord::from(row)))
            .collect())
    }

    /// Projects of a generation whose name contains `needle`, ignoring ASCII case.
    pub async fn search_projects(
        &self,
        migration_id: Option<i32>,
        needle: &str,
    ) -> Result<Vec<ProjectRecord>, DieselError> {
        let Some(id) = self.resolve(migration_id).await? else {
            return Ok(Vec::new());
        };
        let mut conn = self.pool.get().await?;

        // SQLite LIKE is case-insensitive for ASCII
        let pattern = format!("%{}%", escape_like(needle));
        projects::table
            .filter(projects::migration_id.eq(id))
            .filter(projects::name.like(pattern).escape('\\'))
            .order((projects::path.asc(), projects::name.asc()))
            .select(ProjectRow::as_select())
            .load::<ProjectRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(ProjectRecord::from).collect())
    }

    /// All generations, newest first.
    pub async fn list_migrations(&self) -> Result<Vec<MigrationRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        migrations::table
            .order(migrations::id.desc())
            .select(MigrationRecord::as_select())
            .load::<MigrationRecord>(&mut conn)
            .await
    }

    pub async fn get_migration(&self, id: i32) -> Result<Option<MigrationRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        migrations::table
            .find(id)
            .select(MigrationRecord::as_select())
            .first::<MigrationRecord>(&mut conn)
            .await
            .optional()
    }

    pub async fn latest_migration(&self) -> Result<Option<MigrationRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        migrations::table
            .order(migrations::id.desc())
            .select(MigrationRecord::as_select())
            .first::<MigrationRecord>(&mut conn)
            .await
            .optional()
    }

    /// Number of projects stored for a generation.
    pub async fn count_projects(&self, migration_id: i32) -> Result<i64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        projects::table
            .filter(projects::migration_id.eq(migration_id))
            .select(count_star())
            .first(&mut conn)
            .await
    }

    async fn resolve(&self, migration_id: Option<i32>) -> Result<Option<i32>, DieselError> {
        match migration_id {
            Some(id) => Ok(Some(id)),
            None => Ok(self.latest_migration().await?.map(|m| m.id)),
        }
    }
}

/// Make `%`, `_` and the escape character itself match literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
