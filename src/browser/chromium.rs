//! Chromium session over the DevTools protocol.
//!
//! Tabs are CDP page targets. Handles are target ids, listed in the order
//! this session first saw them so "last tab" means "most recently opened".

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{BrowserEngineConfig, BrowserSession, SessionError, TabHandle};

fn driver_err(e: impl Display) -> SessionError {
    SessionError::Driver(e.to_string())
}

fn handle_of(page: &Page) -> TabHandle {
    TabHandle::new(page.target_id().inner().clone())
}

/// Browser session backed by a launched (or remote) Chrome.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    pages: HashMap<TabHandle, Page>,
    order: Vec<TabHandle>,
    current: Option<TabHandle>,
}

impl ChromiumSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch or connect to a browser and route its downloads to `download_dir`.
    pub async fn launch(
        config: &BrowserEngineConfig,
        download_dir: &Path,
    ) -> Result<Self, SessionError> {
        let (browser, mut handler) = match config.remote_url.as_deref() {
            Some(remote_url) => Self::connect_remote(remote_url).await?,
            None => {
                let chrome_path = Self::find_chrome(config)?;
                info!(
                    "Launching browser at {} (headless={})",
                    chrome_path.display(),
                    config.headless
                );

                let mut builder = BrowserConfig::builder()
                    .chrome_executable(chrome_path)
                    .request_timeout(Duration::from_secs(config.timeout));

                // Set headless mode (with_head means NOT headless, confusingly)
                if !config.headless {
                    builder = builder.with_head();
                }

                // Downloads are triggered with window.open, which the popup blocker would eat
                builder = builder
                    .arg("--disable-popup-blocking")
                    .arg("--disable-dev-shm-usage")
                    .arg("--no-first-run")
                    .arg("--no-default-browser-check")
                    .arg("--no-sandbox");

                for arg in &config.chrome_args {
                    builder = builder.arg(arg);
                }

                let browser_config = builder
                    .build()
                    .map_err(|e| driver_err(format!("Failed to build browser config: {}", e)))?;

                Browser::launch(browser_config)
                    .await
                    .map_err(|e| driver_err(format!("Failed to launch browser: {}", e)))?
            }
        };

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            debug!("Browser handler exited");
        });

        let mut session = Self {
            browser,
            handler,
            alive,
            pages: HashMap::new(),
            order: Vec::new(),
            current: None,
        };

        session.set_download_dir(download_dir).await?;

        let tabs = session.list_tabs().await?;
        let first = match tabs.first() {
            Some(handle) => handle.clone(),
            None => {
                let page = session
                    .browser
                    .new_page("about:blank")
                    .await
                    .map_err(driver_err)?;
                session.track(page)
            }
        };
        session.switch_to(&first).await?;

        Ok(session)
    }

    /// Resolve the Chrome binary: explicit config/env first, then well-known paths, then PATH.
    fn find_chrome(config: &BrowserEngineConfig) -> Result<PathBuf, SessionError> {
        if let Some(ref path) = config.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(driver_err(format!(
                "Configured browser executable does not exist: {}",
                path.display()
            )));
        }

        for path in Self::CHROME_PATHS {
            let p = Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(driver_err(
            "Chrome/Chromium not found. Install it or set CHROME_PATH to the browser binary",
        ))
    }

    /// Connect to a remote Chrome instance.
    async fn connect_remote(
        url: &str,
    ) -> Result<(Browser, chromiumoxide::Handler), SessionError> {
        info!("Connecting to remote browser at {}", url);

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| driver_err(format!("Failed to connect to remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| driver_err(format!("Failed to parse browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| driver_err("No webSocketDebuggerUrl in response"))?;

        info!("Connecting to WebSocket: {}", ws_url);

        Browser::connect(ws_url)
            .await
            .map_err(|e| driver_err(format!("Failed to connect to remote browser: {}", e)))
    }

    async fn set_download_dir(&mut self, dir: &Path) -> Result<(), SessionError> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.display().to_string())
            .build()
            .map_err(driver_err)?;
        self.browser.execute(params).await.map_err(driver_err)?;
        debug!("Downloads routed to {}", dir.display());
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::SessionClosed)
        }
    }

    fn track(&mut self, page: Page) -> TabHandle {
        let handle = handle_of(&page);
        if !self.order.contains(&handle) {
            self.order.push(handle.clone());
        }
        self.pages.insert(handle.clone(), page);
        handle
    }

    async fn page(&mut self, handle: &TabHandle) -> Result<Page, SessionError> {
        if let Some(page) = self.pages.get(handle) {
            return Ok(page.clone());
        }
        self.list_tabs().await?;
        self.pages
            .get(handle)
            .cloned()
            .ok_or_else(|| SessionError::StaleHandle(handle.clone()))
    }

    async fn focused(&mut self) -> Result<Page, SessionError> {
        self.ensure_open()?;
        let handle = self
            .current
            .clone()
            .ok_or_else(|| driver_err("no tab has focus"))?;
        self.page(&handle).await
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open_tab(&mut self, url: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.current.is_none() {
            let page = self.browser.new_page(url).await.map_err(driver_err)?;
            self.track(page);
            return Ok(());
        }

        let quoted = serde_json::to_string(url).map_err(driver_err)?;
        self.execute_script(&format!("window.open({}, '_blank');", quoted))
            .await?;
        Ok(())
    }

    async fn switch_to(&mut self, handle: &TabHandle) -> Result<(), SessionError> {
        self.ensure_open()?;
        let page = self.page(handle).await?;
        page.bring_to_front().await.map_err(driver_err)?;
        self.current = Some(handle.clone());
        Ok(())
    }

    async fn close(&mut self, handle: &TabHandle) -> Result<(), SessionError> {
        self.ensure_open()?;
        let page = self.page(handle).await?;
        page.close().await.map_err(driver_err)?;
        self.pages.remove(handle);
        self.order.retain(|h| h != handle);
        if self.current.as_ref() == Some(handle) {
            self.current = None;
        }
        Ok(())
    }

    async fn list_tabs(&mut self) -> Result<Vec<TabHandle>, SessionError> {
        self.ensure_open()?;
        let pages = self.browser.pages().await.map_err(driver_err)?;

        let live: Vec<TabHandle> = pages.iter().map(handle_of).collect();
        self.order.retain(|h| live.contains(h));
        self.pages.clear();
        for page in pages {
            self.track(page);
        }
        Ok(self.order.clone())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let page = self.focused().await?;
        page.goto(url).await.map_err(driver_err)?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        let page = self.focused().await?;
        Ok(page.url().await.map_err(driver_err)?.unwrap_or_default())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        let page = self.focused().await?;
        page.content().await.map_err(driver_err)
    }

    async fn execute_script(&mut self, code: &str) -> Result<serde_json::Value, SessionError> {
        let page = self.focused().await?;
        let result = page.evaluate(code.to_string()).await.map_err(driver_err)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn fill_field(&mut self, selector: &str, value: &str) -> Result<(), SessionError> {
        let page = self.focused().await?;
        let element = page.find_element(selector).await.map_err(driver_err)?;
        element.click().await.map_err(driver_err)?;
        element.type_str(value).await.map_err(driver_err)?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        let page = self.focused().await?;
        let element = page.find_element(selector).await.map_err(driver_err)?;
        element.click().await.map_err(driver_err)?;
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let closed = self.browser.close().await.map_err(driver_err);
        let _ = self.browser.wait().await;
        self.alive.store(false, Ordering::SeqCst);
        self.handler.abort();
        self.pages.clear();
        self.order.clear();
        self.current = None;
        closed.map(|_| ())
    }
}
