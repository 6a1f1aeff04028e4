//! Service layer for replmigrate business logic.
//!
//! This module contains domain logic separated from UI concerns.

pub mod migrate;

pub use migrate::{MigrationOutcome, MigrationService};
