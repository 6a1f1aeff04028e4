//! Tab-list reconciliation.
//!
//! Opening a folder and triggering a download are both fire-and-forget on
//! the browser side; the only observable effect is a change in the set of
//! open tabs. These waits poll that set until it changes as expected.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::status::{StatusEvent, StatusSink, TabWaitKind};
use super::{CrawlConfig, CrawlError};
use crate::browser::{BrowserSession, TabHandle};

/// Observes tab membership. Never opens or closes tabs itself.
#[derive(Clone)]
pub struct TabReconciler {
    poll_interval: Duration,
    heartbeat: Duration,
    sink: Arc<dyn StatusSink>,
}

struct Heartbeat {
    every: Duration,
    next: Duration,
}

impl Heartbeat {
    fn new(every: Duration) -> Self {
        Self { every, next: every }
    }

    fn due(&mut self, elapsed: Duration) -> bool {
        if elapsed >= self.next {
            while self.next <= elapsed {
                self.next += self.every;
            }
            true
        } else {
            false
        }
    }
}

impl TabReconciler {
    pub fn new(config: &CrawlConfig, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            heartbeat: config.heartbeat(),
            sink,
        }
    }

    /// Wait until a tab not in `before` shows up and return it.
    pub async fn wait_for_new_tab<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        before: &HashSet<TabHandle>,
        timeout: Duration,
    ) -> Result<TabHandle, CrawlError> {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(self.heartbeat);

        loop {
            let tabs = session.list_tabs().await?;
            if let Some(handle) = tabs.into_iter().find(|h| !before.contains(h)) {
                debug!("New tab {} after {:?}", handle, start.elapsed());
                return Ok(handle);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(CrawlError::TabOpenTimeout { timeout });
            }
            if heartbeat.due(elapsed) {
                self.sink.emit(StatusEvent::TabWait {
                    kind: TabWaitKind::NewTab,
                    elapsed,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait until the tab count is back down to `before.len()`.
    ///
    /// Returns `false` on timeout: the downloads may simply still be running.
    pub async fn wait_for_tabs_to_close<S: BrowserSession + ?Sized>(
        &self,
        session: &mut S,
        before: &HashSet<TabHandle>,
        timeout: Duration,
    ) -> Result<bool, CrawlError> {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(self.heartbeat);

        loop {
            let open = session.list_tabs().await?.len();
            if open <= before.len() {
                debug!("Tabs back to {} after {:?}", open, start.elapsed());
                return Ok(true);
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!(
                    "{} tab(s) still open after {:?} (baseline {})",
                    open,
                    timeout,
                    before.len()
                );
                return Ok(false);
            }
            if heartbeat.due(elapsed) {
                self.sink.emit(StatusEvent::TabWait {
                    kind: TabWaitKind::DownloadTabs,
                    elapsed,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_fires_once_per_interval() {
        let mut hb = Heartbeat::new(Duration::from_secs(5));
        assert!(!hb.due(Duration::from_secs(4)));
        assert!(hb.due(Duration::from_secs(5)));
        assert!(!hb.due(Duration::from_millis(5500)));
        assert!(hb.due(Duration::from_secs(12)));
        assert!(!hb.due(Duration::from_secs(14)));
        assert!(hb.due(Duration::from_secs(15)));
    }
}
