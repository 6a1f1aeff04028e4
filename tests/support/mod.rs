//! Scripted in-memory browser for crawler tests.
//!
//! Pages are plain HTML keyed by absolute URL and go through the same
//! `browser::dom` extraction as the real driver. Opening an archive URL
//! records a download and adds a transient tab that closes itself after
//! `download_close_delay` (on the tokio clock, so paused-time tests work).

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use replmigrate::browser::{BrowserSession, SessionError, TabHandle};
use replmigrate::crawler::CrawlConfig;

pub const USER: &str = "ada";
pub const ROOT: &str = "https://replit.com/@ada";

struct FakeTab {
    handle: TabHandle,
    url: String,
    closes_at: Option<Instant>,
}

#[derive(Default)]
pub struct FakeSession {
    pages: HashMap<String, String>,
    tabs: Vec<FakeTab>,
    next_id: usize,
    current: Option<TabHandle>,
    quit: bool,
    /// How long a download tab stays open.
    pub download_close_delay: Duration,
    /// Number of upcoming folder opens that never produce a tab.
    pub swallow_opens: usize,
    /// Folder URLs whose tabs never open.
    pub unreachable: Vec<String>,
    /// Where downloads are written, if anywhere.
    pub download_dir: Option<PathBuf>,
    /// Every folder URL passed to `open_tab`, in order.
    pub opened: Vec<String>,
    /// Every archive URL passed to `open_tab`, in order.
    pub downloads: Vec<String>,
    /// Handles closed through `close`, in order.
    pub closed: Vec<TabHandle>,
    /// Form interactions: `fill <selector>` / `click <selector>`.
    pub actions: Vec<String>,
}

impl FakeSession {
    /// A session with one blank tab focused.
    pub fn new() -> Self {
        let mut session = Self::default();
        let handle = session.push_tab("about:blank".to_string(), None);
        session.current = Some(handle);
        session
    }

    pub fn with_page(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }

    pub fn open_tab_count(&mut self) -> usize {
        self.expire();
        self.tabs.len()
    }

    fn push_tab(&mut self, url: String, closes_at: Option<Instant>) -> TabHandle {
        self.next_id += 1;
        let handle = TabHandle::new(format!("tab-{}", self.next_id));
        self.tabs.push(FakeTab {
            handle: handle.clone(),
            url,
            closes_at,
        });
        handle
    }

    fn expire(&mut self) {
        let now = Instant::now();
        let current = &mut self.current;
        self.tabs.retain(|tab| match tab.closes_at {
            Some(at) if at <= now => {
                if current.as_ref() == Some(&tab.handle) {
                    *current = None;
                }
                false
            }
            _ => true,
        });
    }

    fn check_alive(&self) -> Result<(), SessionError> {
        if self.quit {
            Err(SessionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn focused(&self) -> Result<&FakeTab, SessionError> {
        self.check_alive()?;
        self.current
            .as_ref()
            .and_then(|h| self.tabs.iter().find(|t| &t.handle == h))
            .ok_or_else(|| SessionError::Driver("no focused tab".into()))
    }

    fn record_download(&mut self, url: &str) -> Result<(), SessionError> {
        self.downloads.push(url.to_string());
        if let Some(dir) = &self.download_dir {
            let name = url.rsplit('/').next().unwrap_or("download.zip");
            let stem = name.trim_end_matches(".zip");
            write_zip(
                &dir.join(name),
                &[
                    ("main.py", format!("print('{}')\n", stem).as_str()),
                    (".replit", "run = \"python main.py\"\n"),
                ],
            );
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn open_tab(&mut self, url: &str) -> Result<(), SessionError> {
        self.check_alive()?;
        self.expire();

        if url.ends_with(".zip") {
            self.record_download(url)?;
            let closes_at = Instant::now() + self.download_close_delay;
            self.push_tab(url.to_string(), Some(closes_at));
            return Ok(());
        }

        self.opened.push(url.to_string());
        if self.unreachable.iter().any(|u| u == url) {
            return Ok(());
        }
        if self.swallow_opens > 0 {
            self.swallow_opens -= 1;
            return Ok(());
        }
        self.push_tab(url.to_string(), None);
        Ok(())
    }

    async fn switch_to(&mut self, handle: &TabHandle) -> Result<(), SessionError> {
        self.check_alive()?;
        self.expire();
        if !self.tabs.iter().any(|t| &t.handle == handle) {
            return Err(SessionError::StaleHandle(handle.clone()));
        }
        self.current = Some(handle.clone());
        Ok(())
    }

    async fn close(&mut self, handle: &TabHandle) -> Result<(), SessionError> {
        self.check_alive()?;
        self.expire();
        let before = self.tabs.len();
        self.tabs.retain(|t| &t.handle != handle);
        if self.tabs.len() == before {
            return Err(SessionError::StaleHandle(handle.clone()));
        }
        if self.current.as_ref() == Some(handle) {
            self.current = None;
        }
        self.closed.push(handle.clone());
        Ok(())
    }

    async fn list_tabs(&mut self) -> Result<Vec<TabHandle>, SessionError> {
        self.check_alive()?;
        self.expire();
        Ok(self.tabs.iter().map(|t| t.handle.clone()).collect())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.check_alive()?;
        let handle = self.focused()?.handle.clone();
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.handle == handle) {
            tab.url = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.focused()?.url.clone())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        let url = self.focused()?.url.clone();
        Ok(self
            .pages
            .get(&url)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn execute_script(&mut self, _code: &str) -> Result<serde_json::Value, SessionError> {
        self.check_alive()?;
        Ok(serde_json::Value::Null)
    }

    async fn fill_field(&mut self, selector: &str, _value: &str) -> Result<(), SessionError> {
        self.focused()?;
        self.actions.push(format!("fill {}", selector));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), SessionError> {
        self.focused()?;
        self.actions.push(format!("click {}", selector));
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), SessionError> {
        self.check_alive()?;
        self.quit = true;
        self.tabs.clear();
        self.current = None;
        Ok(())
    }
}

/// Locator of a folder as it appears on a listing page.
pub fn folder_url(path: &str) -> String {
    format!("{}?path=folder/{}", ROOT, path)
}

/// Anchor for a project, with metadata where the default layout reads it.
pub fn project_link(name: &str, last_modified: &str, size: &str) -> String {
    format!(
        r#"<a href="/@{user}/{name}"><div><div>icon</div><div><div><span>{lm}</span><span>{size}</span></div></div></div></a>"#,
        user = USER,
        name = name,
        lm = last_modified,
        size = size,
    )
}

/// Anchor for a project missing its size field.
pub fn project_link_without_size(name: &str) -> String {
    format!(
        r#"<a href="/@{user}/{name}"><div><div>icon</div><div><div><span>today</span></div></div></div></a>"#,
        user = USER,
        name = name,
    )
}

pub fn folder_link(path: &str) -> String {
    format!(
        r#"<a href="/@{user}?path=folder/{path}">{path}</a>"#,
        user = USER,
        path = path
    )
}

pub fn page(links: &[String]) -> String {
    format!("<html><body><main>{}</main></body></html>", links.join("\n"))
}

/// Timings that keep tests fast but still exercise every wait.
pub fn fast_config() -> CrawlConfig {
    CrawlConfig {
        tab_open_timeout_secs: 10,
        download_wait_timeout_secs: 10,
        settle_delay_ms: 100,
        poll_interval_ms: 50,
        heartbeat_secs: 5,
        tab_open_retries: 1,
        drain_timeout_secs: 1,
    }
}

pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}
