//! Diesel ORM models for the migration tables.

use diesel::prelude::*;

use crate::models::ProjectRecord;
use crate::schema;

/// One crawl generation.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = schema::migrations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MigrationRecord {
    pub id: i32,
    pub created_at: String,
}

/// Project row as stored.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::projects)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProjectRow {
    pub id: i32,
    pub migration_id: i32,
    pub name: String,
    pub path: String,
    pub link: String,
    pub last_modified: String,
    pub size: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::migrations)]
pub struct NewMigration<'a> {
    pub created_at: &'a str,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::projects)]
pub struct NewProject<'a> {
    pub migration_id: i32,
    pub name: &'a str,
    pub path: &'a str,
    pub link: &'a str,
    pub last_modified: &'a str,
    pub size: &'a str,
}

impl<'a> NewProject<'a> {
    pub fn from_record(migration_id: i32, record: &'a ProjectRecord) -> Self {
        Self {
            migration_id,
            name: &record.name,
            path: &record.path,
            link: &record.locator,
            last_modified: &record.last_modified,
            size: &record.size,
        }
    }
}

/// Convert a database row to a domain model.
impl From<ProjectRow> for ProjectRecord {
    fn from(row: ProjectRow) -> Self {
        ProjectRecord {
            name: row.name,
            locator: row.link,
            path: row.path,
            last_modified: row.last_modified,
            size: row.size,
        }
    }
}
