//! Download triggering and tab settling.

mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use replmigrate::browser::{BrowserSession, TabHandle};
use replmigrate::crawler::{
    CrawlError, DownloadCoordinator, StatusEvent, StatusLog, TabReconciler,
};
use replmigrate::models::ProjectRecord;

use support::{fast_config, FakeSession};

fn projects(names: &[&str]) -> Vec<ProjectRecord> {
    names
        .iter()
        .map(|name| {
            ProjectRecord::new(
                format!("https://replit.com/@ada/{}", name),
                "",
                "today",
                "1 KB",
            )
        })
        .collect()
}

async fn baseline(session: &mut FakeSession) -> HashSet<TabHandle> {
    session.list_tabs().await.unwrap().into_iter().collect()
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tabs_to_close_settles() {
    let log = Arc::new(StatusLog::new());
    let tabs = TabReconciler::new(&fast_config(), log.clone());
    let mut session = FakeSession::new();
    session.download_close_delay = Duration::from_secs(3);

    let before = baseline(&mut session).await;
    session
        .open_tab("https://replit.com/@ada/one.zip")
        .await
        .unwrap();
    assert_eq!(session.open_tab_count(), 2);

    let settled = tabs
        .wait_for_tabs_to_close(&mut session, &before, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(settled);
    assert_eq!(session.open_tab_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tabs_to_close_times_out() {
    let log = Arc::new(StatusLog::new());
    let tabs = TabReconciler::new(&fast_config(), log.clone());
    let mut session = FakeSession::new();
    session.download_close_delay = Duration::from_secs(60);

    let before = baseline(&mut session).await;
    session
        .open_tab("https://replit.com/@ada/one.zip")
        .await
        .unwrap();

    let settled = tabs
        .wait_for_tabs_to_close(&mut session, &before, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(!settled);
    // Heartbeats at 5s and 10s at most
    let heartbeats = log
        .events()
        .into_iter()
        .filter(|e| matches!(e, StatusEvent::TabWait { .. }))
        .count();
    assert!((1..=2).contains(&heartbeats));
}

#[tokio::test(start_paused = true)]
async fn test_slow_downloads_are_reported_not_fatal() {
    let log = Arc::new(StatusLog::new());
    let coordinator = DownloadCoordinator::new(&fast_config(), log.clone(), CancellationToken::new());
    let mut session = FakeSession::new();
    session.download_close_delay = Duration::from_secs(15);

    let summary = coordinator
        .download_all(&mut session, &projects(&["a", "b", "c"]))
        .await
        .unwrap();

    assert_eq!(summary.triggered, 3);
    assert!(!summary.settled);
    assert_eq!(session.downloads.len(), 3);

    let warnings = log.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0],
        StatusEvent::DownloadsUnsettled {
            pending: 3,
            timeout: Duration::from_secs(10),
        }
    );
}

#[tokio::test]
async fn test_downloads_fire_in_order() {
    let log = Arc::new(StatusLog::new());
    let coordinator = DownloadCoordinator::new(&fast_config(), log.clone(), CancellationToken::new());
    let mut session = FakeSession::new();

    let summary = coordinator
        .download_all(&mut session, &projects(&["x", "y"]))
        .await
        .unwrap();

    assert!(summary.settled);
    assert_eq!(
        session.downloads,
        vec![
            "https://replit.com/@ada/x.zip",
            "https://replit.com/@ada/y.zip"
        ]
    );
    let triggered: Vec<_> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            StatusEvent::DownloadTriggered { index, total, name } => Some((index, total, name)),
            _ => None,
        })
        .collect();
    assert_eq!(
        triggered,
        vec![(1, 2, "x".to_string()), (2, 2, "y".to_string())]
    );
}

#[tokio::test]
async fn test_repeat_download_fires_again() {
    let log = Arc::new(StatusLog::new());
    let coordinator = DownloadCoordinator::new(&fast_config(), log.clone(), CancellationToken::new());
    let mut session = FakeSession::new();
    let batch = projects(&["x"]);

    coordinator.download_all(&mut session, &batch).await.unwrap();
    coordinator.download_all(&mut session, &batch).await.unwrap();

    assert_eq!(session.downloads.len(), 2);
}

#[tokio::test]
async fn test_empty_batch_touches_nothing() {
    let log = Arc::new(StatusLog::new());
    let coordinator = DownloadCoordinator::new(&fast_config(), log.clone(), CancellationToken::new());
    let mut session = FakeSession::new();

    let summary = coordinator.download_all(&mut session, &[]).await.unwrap();

    assert_eq!(summary.triggered, 0);
    assert!(summary.settled);
    assert!(log.events().is_empty());
}

#[tokio::test]
async fn test_cancelled_download_batch() {
    let log = Arc::new(StatusLog::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let coordinator = DownloadCoordinator::new(&fast_config(), log.clone(), cancel);
    let mut session = FakeSession::new();

    let err = coordinator
        .download_all(&mut session, &projects(&["x"]))
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Cancelled));
    assert!(session.downloads.is_empty());
}
