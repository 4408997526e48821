//! Directory watcher producing file arrivals.

use futures_util::Stream;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::config::{Config, WatchMode};
use crate::error::WatchError;
use crate::models::FileArrival;

/// Decides which paths count as new arrivals. Each path is admitted once.
#[derive(Debug)]
pub struct ArrivalFilter {
    dir: PathBuf,
    seen: HashSet<PathBuf>,
}

impl ArrivalFilter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: HashSet::new(),
        }
    }

    /// Admit `path` if it is a visible regular file directly inside the
    /// watched directory and has not been seen before.
    pub fn admit(&mut self, path: &Path) -> Option<FileArrival> {
        if path.parent() != Some(self.dir.as_path()) {
            return None;
        }
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true);
        if hidden || !path.is_file() {
            return None;
        }
        if !self.seen.insert(path.to_path_buf()) {
            return None;
        }
        Some(FileArrival::new(path))
    }
}

/// Stream of arrivals. Watching stops when this is dropped.
pub struct FileArrivals {
    dir: PathBuf,
    rx: ReceiverStream<FileArrival>,
    _watcher: Box<dyn Watcher + Send>,
}

impl FileArrivals {
    /// The canonical directory being watched.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Stream for FileArrivals {
    type Item = FileArrival;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

/// Watches a single directory, non-recursively.
pub struct DirectoryWatcher {
    dir: PathBuf,
    mode: WatchMode,
    poll_interval: Duration,
    emit_existing: bool,
    capacity: usize,
}

impl DirectoryWatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.watch_dir.clone(),
            mode: config.watch_mode,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            emit_existing: config.emit_existing,
            capacity: 100,
        }
    }

    /// Start watching. Must be called from within a tokio runtime.
    pub fn start(self) -> Result<FileArrivals, WatchError> {
        if !self.dir.exists() {
            return Err(WatchError::MissingDir(self.dir));
        }
        if !self.dir.is_dir() {
            return Err(WatchError::NotADirectory(self.dir));
        }
        let dir = std::fs::canonicalize(&self.dir).map_err(|source| WatchError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Raw notify events, filtered on the runtime side.
        let (raw_tx, mut raw_rx) = mpsc::channel::<Event>(self.capacity);
        let handler = move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = raw_tx.blocking_send(event);
            }
            Err(e) => warn!("Watch error: {}", e),
        };

        let mut watcher: Box<dyn Watcher + Send> = match self.mode {
            WatchMode::Native => Box::new(RecommendedWatcher::new(handler, NotifyConfig::default())?),
            WatchMode::Poll => Box::new(PollWatcher::new(
                handler,
                NotifyConfig::default().with_poll_interval(self.poll_interval),
            )?),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!("Watching {:?} ({:?})", dir, self.mode);

        let (tx, rx) = mpsc::channel::<FileArrival>(self.capacity);
        let task_dir = dir.clone();
        let emit_existing = self.emit_existing;

        tokio::spawn(async move {
            let mut filter = ArrivalFilter::new(&task_dir);

            // The watcher is already running, so files landing during the
            // scan are caught by one side or the other; the filter dedups.
            if emit_existing {
                for path in existing_files(&task_dir) {
                    if let Some(arrival) = filter.admit(&path) {
                        if tx.send(arrival).await.is_err() {
                            return;
                        }
                    }
                }
            }

            while let Some(event) = raw_rx.recv().await {
                if !is_arrival_kind(&event.kind) {
                    continue;
                }
                for path in &event.paths {
                    if let Some(arrival) = filter.admit(path) {
                        debug!("New file: {:?}", arrival.path);
                        if tx.send(arrival).await.is_err() {
                            return;
                        }
                    }
                }
            }
            debug!("Watcher event channel closed");
        });

        Ok(FileArrivals {
            dir,
            rx: ReceiverStream::new(rx),
            _watcher: watcher,
        })
    }
}

fn is_arrival_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)))
}

/// Files already in `dir`, sorted by name.
fn existing_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to scan {:?}: {}", dir, e);
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn config_for(dir: &Path, mode: WatchMode) -> Config {
        Config {
            watch_dir: dir.to_path_buf(),
            watch_mode: mode,
            poll_interval_ms: 50,
            ..Config::default()
        }
    }

    async fn next_arrival(arrivals: &mut FileArrivals) -> FileArrival {
        tokio::time::timeout(Duration::from_secs(10), arrivals.next())
            .await
            .expect("timed out waiting for arrival")
            .expect("arrival stream ended")
    }

    #[test]
    fn test_filter_admits_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();

        let mut filter = ArrivalFilter::new(dir.path());
        let arrival = filter.admit(&file).unwrap();
        assert_eq!(arrival.path, file);
        assert!(filter.admit(&file).is_none());
    }

    #[test]
    fn test_filter_skips_hidden_dirs_and_nested() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join(".partial");
        let sub = dir.path().join("sub");
        std::fs::write(&hidden, "x").unwrap();
        std::fs::create_dir(&sub).unwrap();
        let nested = sub.join("deep.txt");
        std::fs::write(&nested, "x").unwrap();

        let mut filter = ArrivalFilter::new(dir.path());
        assert!(filter.admit(&hidden).is_none());
        assert!(filter.admit(&sub).is_none());
        assert!(filter.admit(&nested).is_none());
        assert!(filter.admit(&dir.path().join("gone.txt")).is_none());
    }

    #[test]
    fn test_start_rejects_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir.path().join("nope"), WatchMode::Native);
        let err = DirectoryWatcher::new(&config).start().err().unwrap();
        assert!(matches!(err, WatchError::MissingDir(_)));
    }

    #[tokio::test]
    async fn test_existing_files_emitted_first_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join(".hidden"), "h").unwrap();

        let config = config_for(dir.path(), WatchMode::Poll);
        let mut arrivals = DirectoryWatcher::new(&config).start().unwrap();

        let first = next_arrival(&mut arrivals).await;
        let second = next_arrival(&mut arrivals).await;
        assert!(first.path.ends_with("a.txt"));
        assert!(second.path.ends_with("b.txt"));
        assert!(first.path.is_absolute());
    }

    #[tokio::test]
    async fn test_new_file_detected_by_polling() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), WatchMode::Poll);
        let mut arrivals = DirectoryWatcher::new(&config).start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("new.txt"), "n").unwrap();

        let arrival = next_arrival(&mut arrivals).await;
        assert!(arrival.path.ends_with("new.txt"));
        assert_eq!(arrival.path.parent(), Some(arrivals.dir()));
    }

    #[tokio::test]
    async fn test_existing_files_skipped_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "o").unwrap();

        let mut config = config_for(dir.path(), WatchMode::Poll);
        config.emit_existing = false;
        let mut arrivals = DirectoryWatcher::new(&config).start().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("fresh.txt"), "f").unwrap();

        let arrival = next_arrival(&mut arrivals).await;
        assert!(arrival.path.ends_with("fresh.txt"));
    }
}
