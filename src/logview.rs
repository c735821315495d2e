//! Periodic re-reading of instance log files.
//!
//! A [`LogSubscription`] owns the polling task. Cancelling it, dropping it, or
//! dropping the receiving end of the event channel all end the task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use strip_ansi_escapes::strip;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::Event;

/// Result of reading an instance's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogContent {
    /// The instance was not started with `--errorlog`.
    NotConfigured,
    /// The configured file does not exist (yet).
    Missing,
    Text(String),
}

impl LogContent {
    /// Placeholder or text shown in log panes.
    pub fn display_text(&self) -> &str {
        match self {
            LogContent::NotConfigured => "< logfile not specified >",
            LogContent::Missing => "< logfile not present >",
            LogContent::Text(text) => text,
        }
    }
}

/// Reads a log file in full, with ANSI escapes removed.
pub fn read_log(path: Option<&Path>) -> LogContent {
    let Some(path) = path else {
        return LogContent::NotConfigured;
    };
    match std::fs::read(path) {
        Ok(bytes) => LogContent::Text(sanitize_text(&bytes)),
        Err(_) => LogContent::Missing,
    }
}

/// Strips ANSI escape codes; invalid UTF-8 sequences are replaced.
pub fn sanitize_text(bytes: &[u8]) -> String {
    let stripped = strip(bytes);
    String::from_utf8_lossy(&stripped).to_string()
}

/// Handle to a running log poll.
#[derive(Debug)]
pub struct LogSubscription {
    id: u64,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LogSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops polling and waits for the task to finish.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Starts re-reading `path` every `interval`, sending each read as an
/// [`Event::LogSnapshot`] tagged with `id`. The first read happens immediately.
pub fn subscribe(
    id: u64,
    path: Option<PathBuf>,
    interval: Duration,
    tx: mpsc::Sender<Event>,
) -> LogSubscription {
    let (cancel_tx, mut cancel_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                _ = ticker.tick() => {
                    let content = read_log(path.as_deref());
                    if tx.send(Event::LogSnapshot { subscription: id, content }).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(subscription = id, "log subscription ended");
    });
    LogSubscription {
        id,
        cancel: Some(cancel_tx),
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_snapshot(rx: &mut mpsc::Receiver<Event>) -> (u64, LogContent) {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(Event::LogSnapshot { subscription, content })) => (subscription, content),
            other => panic!("expected log snapshot, got {:?}", other),
        }
    }

    #[test]
    fn read_log_distinguishes_missing_and_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        assert_eq!(read_log(None), LogContent::NotConfigured);
        assert_eq!(read_log(Some(&path)), LogContent::Missing);
        std::fs::write(&path, "\u{1b}[31mERROR\u{1b}[0m boom\n").unwrap();
        assert_eq!(read_log(Some(&path)), LogContent::Text("ERROR boom\n".to_string()));
    }

    #[tokio::test]
    async fn subscription_rereads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "one\n").unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let sub = subscribe(7, Some(path.clone()), Duration::from_millis(20), tx);
        assert_eq!(next_snapshot(&mut rx).await, (7, LogContent::Text("one\n".to_string())));

        std::fs::write(&path, "one\ntwo\n").unwrap();
        loop {
            let (_, content) = next_snapshot(&mut rx).await;
            if content == LogContent::Text("one\ntwo\n".to_string()) {
                break;
            }
        }
        sub.cancel().await;
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_sending() {
        let (tx, mut rx) = mpsc::channel(8);
        let sub = subscribe(1, None, Duration::from_millis(10), tx);
        assert_eq!(next_snapshot(&mut rx).await.1, LogContent::NotConfigured);

        sub.cancel().await;
        // Drain anything queued before the cancel; the channel then closes.
        while let Some(_event) = rx.recv().await {}
    }

    #[tokio::test]
    async fn dropped_subscription_is_aborted() {
        let (tx, mut rx) = mpsc::channel(8);
        let sub = subscribe(2, None, Duration::from_millis(10), tx);
        let _ = next_snapshot(&mut rx).await;
        drop(sub);
        tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(_event) = rx.recv().await {}
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn closed_receiver_ends_task() {
        let (tx, rx) = mpsc::channel(1);
        let sub = subscribe(3, None, Duration::from_millis(5), tx);
        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), async {
            while !sub.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
