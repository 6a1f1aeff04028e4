//! Configuration management for replmigrate using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::browser::BrowserEngineConfig;
use crate::crawler::CrawlConfig;
use crate::organize::DEFAULT_IGNORE_FILE;
use crate::site::LayoutConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "replmigrate.db";

/// Default output subdirectory name.
const OUTPUT_SUBDIR: &str = "output";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var.
    pub database_url: Option<String>,
    /// Where downloads land and projects are organized.
    pub output_dir: PathBuf,
    /// Ignore rules file.
    pub ignore_file: PathBuf,
    pub browser: BrowserEngineConfig,
    pub crawl: CrawlConfig,
    pub layout: LayoutConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/replmigrate/ for user data
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("replmigrate");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            output_dir: data_dir.join(OUTPUT_SUBDIR),
            ignore_file: data_dir.join(DEFAULT_IGNORE_FILE),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            browser: BrowserEngineConfig::default(),
            crawl: CrawlConfig::default(),
            layout: LayoutConfig::default(),
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (dir, label) in [(&self.data_dir, "data"), (&self.output_dir, "output")] {
            tracing::debug!("Ensuring {} directory {}", label, dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory (absolute, `~`-prefixed, or relative to the config file).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Database filename inside the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_file: Option<String>,
    pub browser: BrowserEngineConfig,
    pub crawl: CrawlConfig,
    pub layout: LayoutConfig,

    /// Path this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers replmigrate config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("replmigrate").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}; using defaults", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded to the home directory.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            *settings = Settings::with_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref output) = self.output_dir {
            settings.output_dir = self.resolve_path(output, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref ignore) = self.ignore_file {
            settings.ignore_file = self.resolve_path(ignore, base_dir);
        }
        settings.browser = self.browser.clone();
        settings.crawl = self.crawl.clone();
        settings.layout = self.layout.clone();
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (--config).
    pub config_path: Option<PathBuf>,
    /// Data directory override (--data).
    pub data: Option<PathBuf>,
    /// Output directory override (--output).
    pub output: Option<PathBuf>,
}

/// Resolve data path to a directory.
/// If path points to a .db file, returns its parent directory.
fn resolve_data_path_to_dir(path: &Path) -> PathBuf {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };

    if is_database_file(&path) {
        path.parent().unwrap_or(Path::new(".")).to_path_buf()
    } else {
        path
    }
}

fn is_database_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Config::default()
            }
        };
    }

    // Priority 2: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = load_file_config(&options).await;
    let mut settings = Settings::default();

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence over the config file
    if let Some(ref data) = options.data {
        let data_dir = resolve_data_path_to_dir(data);
        if config.output_dir.is_none() {
            settings.output_dir = data_dir.join(OUTPUT_SUBDIR);
        }
        if config.ignore_file.is_none() {
            settings.ignore_file = data_dir.join(DEFAULT_IGNORE_FILE);
        }
        if is_database_file(data) {
            if let Some(name) = data.file_name() {
                settings.database_filename = name.to_string_lossy().into_owned();
            }
        }
        settings.data_dir = data_dir;
    }
    if let Some(ref output) = options.output {
        settings.output_dir = resolve_data_path_to_dir(output);
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    settings.browser = settings.browser.with_env_overrides();

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_toml_with_sections() {
        let config = Config::parse(
            r#"
output_dir = "out"

[crawl]
settle_delay_ms = 500
tab_open_retries = 3

[browser]
headless = true
"#,
            Path::new("replmigrate.toml"),
        )
        .unwrap();

        assert_eq!(config.output_dir.as_deref(), Some("out"));
        assert_eq!(config.crawl.settle_delay_ms, 500);
        assert_eq!(config.crawl.tab_open_retries, 3);
        assert_eq!(config.crawl.tab_open_timeout_secs, 10);
        assert!(config.browser.headless);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse("crawl:\n  heartbeat_secs: 2\n", Path::new("c.yaml")).unwrap();
        assert_eq!(yaml.crawl.heartbeat_secs, 2);

        let json = Config::parse(r#"{"database": "x.db"}"#, Path::new("c.json")).unwrap();
        assert_eq!(json.database.as_deref(), Some("x.db"));

        assert!(Config::parse("{", Path::new("c.json")).is_err());
    }

    #[test]
    fn test_apply_resolves_relative_paths() {
        let config = Config {
            data_dir: Some("data".into()),
            ignore_file: Some("rules.txt".into()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc/replmigrate"));

        assert_eq!(settings.data_dir, PathBuf::from("/etc/replmigrate/data"));
        assert_eq!(
            settings.output_dir,
            PathBuf::from("/etc/replmigrate/data/output")
        );
        assert_eq!(
            settings.ignore_file,
            PathBuf::from("/etc/replmigrate/rules.txt")
        );
        assert_eq!(
            settings.database_url(),
            "sqlite:/etc/replmigrate/data/replmigrate.db"
        );
    }

    #[test]
    fn test_resolve_path_expands_home() {
        let config = Config::default();
        let base = Path::new("/base");

        assert_eq!(config.resolve_path("data", base), PathBuf::from("/base/data"));
        assert_eq!(config.resolve_path("/srv/data", base), PathBuf::from("/srv/data"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.resolve_path("~", base), home);
            assert_eq!(config.resolve_path("~/x", base), home.join("x"));
        }
    }

    #[tokio::test]
    async fn test_load_from_path_records_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replmigrate.toml");
        fs::write(&path, "database = \"scans.db\"\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("scans.db"));
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_data_path_to_db_file_uses_parent() {
        assert_eq!(
            resolve_data_path_to_dir(Path::new("/srv/scans/replmigrate.db")),
            PathBuf::from("/srv/scans")
        );
        assert_eq!(
            resolve_data_path_to_dir(Path::new("/srv/scans")),
            PathBuf::from("/srv/scans")
        );
    }

    #[tokio::test]
    async fn test_data_override_with_db_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("empty.toml");
        fs::write(&config_path, "").unwrap();

        let (settings, _) = load_settings_with_options(LoadOptions {
            config_path: Some(config_path),
            data: Some(dir.path().join("scans.db")),
            output: None,
        })
        .await;

        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.database_path(), dir.path().join("scans.db"));
        assert_eq!(settings.output_dir, dir.path().join("output"));
    }
}
