#![forbid(unsafe_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::BoardError;

/// Quiet period after the last raw event before a change is reported.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Coalesced notice that something under a watched directory changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed;

/// What a spawned watcher delivers: a change, or a backend error message.
pub type Notice = Result<Changed, String>;

pub struct ChangeWatcher {
    backend: Option<RecommendedWatcher>,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    paths: Vec<PathBuf>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("paths", &self.paths)
            .field("open", &self.backend.is_some())
            .finish()
    }
}

impl ChangeWatcher {
    /// Watches each directory non-recursively. Fails on the first path that
    /// cannot be observed.
    pub fn new<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Self, BoardError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut backend = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|source| BoardError::Watch {
            path: PathBuf::new(),
            source,
        })?;

        let mut watched = Vec::new();
        for path in paths {
            let path = path.as_ref();
            backend
                .watch(path, RecursiveMode::NonRecursive)
                .map_err(|source| BoardError::Watch {
                    path: path.to_path_buf(),
                    source,
                })?;
            debug!(path = %path.display(), "watching");
            watched.push(path.to_path_buf());
        }

        Ok(Self {
            backend: Some(backend),
            events: rx,
            paths: watched,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delivers debounced changes until `shutdown` resolves or the backend
    /// goes away. Backend errors are reported and the loop keeps going.
    pub async fn run<F, C, E>(&mut self, shutdown: F, mut on_change: C, mut on_error: E)
    where
        F: Future<Output = ()>,
        C: FnMut(),
        E: FnMut(&notify::Error),
    {
        tokio::pin!(shutdown);
        let mut deadline: Option<Instant> = None;

        loop {
            let quiet = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = &mut shutdown => return,
                ev = self.events.recv() => match ev {
                    Some(Ok(event)) => {
                        if is_relevant(&event) {
                            deadline = Some(Instant::now() + DEBOUNCE);
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "watcher error");
                        on_error(&e);
                    }
                    None => return,
                },
                () = quiet => {
                    deadline = None;
                    on_change();
                }
            }
        }
    }

    /// Runs on a tokio task and reports changes over a channel. Backend
    /// errors arrive on the same channel as `Err(message)`.
    #[must_use]
    pub fn spawn(mut self) -> WatchHandle {
        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            self.run(
                shutdown,
                || {
                    // A full channel already holds an undelivered notice.
                    let _ = tx.try_send(Ok(Changed));
                },
                |e| {
                    let _ = tx.try_send(Err(e.to_string()));
                },
            )
            .await;
            self.close();
        });
        WatchHandle {
            changes: rx,
            stop: Some(stop_tx),
            task,
        }
    }

    /// Stops OS delivery.
    pub fn close(mut self) {
        if self.backend.take().is_some() {
            debug!(paths = self.paths.len(), "watcher closed");
        }
    }
}

// Reads produce access events; reacting to them would make every reload
// trigger another.
fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

/// A watcher running on its own task.
#[derive(Debug)]
pub struct WatchHandle {
    changes: mpsc::Receiver<Notice>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub async fn recv(&mut self) -> Option<Notice> {
        self.changes.recv().await
    }

    /// Non-blocking: drains pending changes into one. Stops at the first
    /// error so it is not swallowed; later notices stay queued.
    pub fn try_recv(&mut self) -> Option<Notice> {
        let mut seen = None;
        while let Ok(notice) = self.changes.try_recv() {
            match notice {
                Ok(c) => seen = Some(Ok(c)),
                Err(e) => return Some(Err(e)),
            }
        }
        seen
    }

    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "watcher task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_events_are_ignored() {
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any));
        let modify = Event::new(EventKind::Modify(notify::event::ModifyKind::Any));
        assert!(!is_relevant(&access));
        assert!(is_relevant(&modify));
    }

    #[test]
    fn missing_path_fails_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChangeWatcher::new([dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, BoardError::Watch { .. }));
        assert_eq!(err.code(), "WATCH_ERROR");
    }

    #[tokio::test]
    async fn shutdown_returns_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = ChangeWatcher::new([dir.path()]).unwrap();
        assert_eq!(w.paths(), [dir.path().to_path_buf()]);
        tokio::time::timeout(Duration::from_secs(2), w.run(async {}, || {}, |_| {}))
            .await
            .unwrap();
        w.close();
    }

    fn handle_with(notices: &[Notice]) -> WatchHandle {
        let (tx, rx) = mpsc::channel(notices.len().max(1));
        for n in notices {
            tx.try_send(n.clone()).unwrap();
        }
        WatchHandle {
            changes: rx,
            stop: None,
            task: tokio::spawn(async {}),
        }
    }

    #[tokio::test]
    async fn try_recv_surfaces_errors_before_coalescing_past_them() {
        let mut handle = handle_with(&[Ok(Changed), Err("queue overflow".to_owned()), Ok(Changed), Ok(Changed)]);
        assert_eq!(handle.try_recv(), Some(Err("queue overflow".to_owned())));
        assert_eq!(handle.try_recv(), Some(Ok(Changed)));
        assert_eq!(handle.try_recv(), None);
        handle.close().await;
    }
}
