//! replmigrate - bulk download and catalogue of Replit projects.
//!
//! Walks a user's remote folder tree through a real browser session,
//! triggers an archive download for every project, then organizes the
//! archives into a local directory tree mirroring the remote one.

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod models;
pub mod organize;
pub mod repository;
pub mod schema;
pub mod services;
pub mod site;
