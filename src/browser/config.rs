//! Browser launch configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Browser launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run without a visible window (default: false).
    /// Logging in may require solving a CAPTCHA by hand.
    #[serde(default)]
    pub headless: bool,

    /// Chrome/Chromium executable. Overridden by `CHROME_PATH`.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Navigation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            remote_url: None,
            chrome_args: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

impl BrowserEngineConfig {
    /// Apply `CHROME_PATH` / `CHROME_REMOTE_URL` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = std::env::var("CHROME_PATH").ok().filter(|s| !s.is_empty()) {
            tracing::debug!("Using CHROME_PATH from environment: {}", path);
            self.executable = Some(PathBuf::from(path));
        }
        if let Some(url) = std::env::var("CHROME_REMOTE_URL")
            .ok()
            .filter(|s| !s.is_empty())
        {
            tracing::debug!("Using CHROME_REMOTE_URL from environment: {}", url);
            self.remote_url = Some(url);
        }
        self
    }
}
