//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod migrate;
mod organize;
mod scans;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::site::Credentials;

#[derive(Parser)]
#[command(name = "replmigrate")]
#[command(about = "Download and catalogue every project in a Replit account")]
#[command(version)]
pub struct Cli {
    /// Data directory or database file (overrides config file).
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Output directory for downloaded projects (overrides config file)
    #[arg(long, short = 'o', global = true)]
    output: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Replit account to log in with.
#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Replit username (whose projects are crawled)
    #[arg(long, env = "REPLIT_USERNAME")]
    username: String,

    /// Email address used to log in
    #[arg(long, env = "REPLIT_EMAIL")]
    email: String,

    /// Account password
    #[arg(long, env = "REPLIT_PASSWORD", hide_env_values = true)]
    password: String,

    /// Do not pause for a CAPTCHA after submitting the login form
    #[arg(long)]
    no_login_prompt: bool,
}

impl LoginArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, crawl all projects, download, organize, and record a new scan
    Migrate {
        #[command(flatten)]
        login: LoginArgs,
    },

    /// Download the projects of a stored scan again (no crawling)
    Redownload {
        /// Scan id (see `replmigrate scans`)
        migration_id: i32,
        #[command(flatten)]
        login: LoginArgs,
    },

    /// Organize already downloaded archives of a stored scan
    Organize {
        /// Scan id (defaults to the newest)
        migration_id: Option<i32>,
    },

    /// List stored scans
    Scans,

    /// List projects of a stored scan
    Projects {
        /// Scan id (defaults to the newest)
        migration_id: Option<i32>,
        /// Only show projects whose name contains this text
        #[arg(short, long)]
        name: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
        output: cli.output,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Migrate { login } => {
            migrate::cmd_migrate(&settings, &login.credentials(), !login.no_login_prompt).await
        }
        Commands::Redownload {
            migration_id,
            login,
        } => {
            migrate::cmd_redownload(
                &settings,
                migration_id,
                &login.credentials(),
                !login.no_login_prompt,
            )
            .await
        }
        Commands::Organize { migration_id } => {
            organize::cmd_organize(&settings, migration_id).await
        }
        Commands::Scans => scans::cmd_scans(&settings).await,
        Commands::Projects { migration_id, name } => {
            scans::cmd_projects(&settings, migration_id, name.as_deref()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_flags() {
        let cli = Cli::try_parse_from([
            "replmigrate",
            "-v",
            "migrate",
            "--username",
            "ada",
            "--email",
            "ada@example.com",
            "--password",
            "pw",
            "--no-login-prompt",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Migrate { login } => {
                assert_eq!(login.credentials().username, "ada");
                assert!(login.no_login_prompt);
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_parse_projects_filter() {
        let cli = Cli::try_parse_from(["replmigrate", "projects", "3", "--name", "snake"]).unwrap();
        match cli.command {
            Commands::Projects { migration_id, name } => {
                assert_eq!(migration_id, Some(3));
                assert_eq!(name.as_deref(), Some("snake"));
            }
            _ => panic!("expected projects"),
        }
    }
}
