//! Browser session capability.
//!
//! The crawler never talks to a driver directly; it drives a
//! [`BrowserSession`], which exposes just the tab/DOM operations it needs.
//! [`ChromiumSession`] is the real implementation (CDP via chromiumoxide).

mod config;
pub mod dom;

#[cfg(feature = "browser")]
mod chromium;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

pub use config::BrowserEngineConfig;
pub use dom::{FieldPath, LinkElement, LinkQuery};

#[cfg(feature = "browser")]
pub use chromium::ChromiumSession;

/// Opaque identifier of an open tab. Owned by the session; everyone else
/// only compares handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TabHandle(String);

impl TabHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by a browser session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser session is closed")]
    SessionClosed,

    #[error("tab {0} is no longer open")]
    StaleHandle(TabHandle),

    #[error("browser driver error: {0}")]
    Driver(String),
}

/// Remotely controllable browser.
///
/// Calls never retry; that is up to the caller. Every call after the
/// browser process has gone away fails with [`SessionError::SessionClosed`].
#[async_trait]
pub trait BrowserSession: Send {
    /// Fire an open-in-new-tab action from the focused tab. The tab list
    /// changes asynchronously; use [`crate::crawler::TabReconciler`] to
    /// learn the new handle.
    async fn open_tab(&mut self, url: &str) -> Result<(), SessionError>;

    /// Move driver focus to `handle`.
    async fn switch_to(&mut self, handle: &TabHandle) -> Result<(), SessionError>;

    /// Close `handle`. Focus is left unset if it was the focused tab.
    async fn close(&mut self, handle: &TabHandle) -> Result<(), SessionError>;

    /// Open tabs, oldest first.
    async fn list_tabs(&mut self) -> Result<Vec<TabHandle>, SessionError>;

    /// Navigate the focused tab.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// URL of the focused tab.
    async fn current_url(&mut self) -> Result<String, SessionError>;

    /// Serialized DOM of the focused tab.
    async fn page_source(&mut self) -> Result<String, SessionError>;

    /// Anchors in the focused tab matching `query`, in document order.
    async fn find_links(&mut self, query: &LinkQuery) -> Result<Vec<LinkElement>, SessionError> {
        let base = self.current_url().await?;
        let html = self.page_source().await?;
        Ok(dom::find_links(&html, &base, query))
    }

    async fn execute_script(&mut self, code: &str) -> Result<serde_json::Value, SessionError>;

    /// Type `value` into the form field matched by a CSS selector.
    async fn fill_field(&mut self, selector: &str, value: &str) -> Result<(), SessionError>;

    /// Click the element matched by a CSS selector.
    async fn click(&mut self, selector: &str) -> Result<(), SessionError>;

    /// Shut the browser down. The session is closed afterwards.
    async fn quit(&mut self) -> Result<(), SessionError>;
}
