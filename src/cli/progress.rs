//! Terminal rendering of migration status events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::crawler::{StatusEvent, TabWaitKind};

/// Counters gathered while rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderSummary {
    pub warnings: usize,
    pub downloads: usize,
}

/// Print events as they arrive until every sender is dropped.
pub fn spawn_renderer(mut rx: mpsc::UnboundedReceiver<StatusEvent>) -> JoinHandle<RenderSummary> {
    tokio::spawn(async move {
        let mut summary = RenderSummary::default();
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = rx.recv().await {
            if event.is_warning() {
                summary.warnings += 1;
            }

            match &event {
                StatusEvent::Organizing { index, total, name } => {
                    let pb = bar.get_or_insert_with(|| organize_bar(*total as u64));
                    pb.set_position(index.saturating_sub(1) as u64);
                    pb.set_message(format!("Unzipping {}", name));
                    continue;
                }
                StatusEvent::IgnoredRemoved { .. } => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                }
                StatusEvent::DownloadTriggered { .. } => summary.downloads += 1,
                _ => {}
            }

            let line = render(&event);
            match &bar {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            }
        }

        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
        summary
    })
}

fn organize_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        pb.set_style(bar_style.progress_chars("█▓░"));
    }
    pb
}

fn render(event: &StatusEvent) -> String {
    match event {
        StatusEvent::Message(_) => format!("{} {}", style("→").cyan(), event),
        StatusEvent::FolderEntered { .. } => style(event.to_string()).bold().to_string(),
        StatusEvent::FolderClosed { .. } | StatusEvent::FolderSkipped { .. } => {
            style(event.to_string()).dim().to_string()
        }
        StatusEvent::TabWait { kind, .. } => {
            let line = style(event.to_string()).dim();
            match kind {
                TabWaitKind::NewTab => line.to_string(),
                TabWaitKind::DownloadTabs => line.italic().to_string(),
            }
        }
        StatusEvent::IgnoredRemoved { .. } => format!("{} {}", style("✓").green(), event),
        _ if event.is_warning() => format!("{} {}", style("!").yellow(), event),
        _ => event.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_renderer_counts_warnings_and_downloads() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_renderer(rx);

        tx.send(StatusEvent::DownloadTriggered {
            index: 1,
            total: 1,
            name: "snake".into(),
        })
        .unwrap();
        tx.send(StatusEvent::MissingArchive {
            name: "snake".into(),
            expected: PathBuf::from("/out/snake.zip"),
        })
        .unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(summary.downloads, 1);
        assert_eq!(summary.warnings, 1);
    }
}
