//! The debounced watch service.
//!
//! A [`WatchService`] registers a set of root directories with the platform
//! notification backend, collapses event bursts in a background thread, and
//! hands the surviving [`FileChange`]s to the caller through an async channel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::event::FileChange;
use crate::ignore::is_ignored;

/// How often the debounce thread wakes to flush quiet entries.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the outgoing event channel.
const EVENT_BUFFER: usize = 256;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Errors that can occur while operating the watch service.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The service failed to start.
    #[error("failed to start watch service: {0}")]
    StartFailed(String),

    /// The service failed to stop cleanly.
    #[error("failed to stop watch service: {0}")]
    StopFailed(String),

    /// The service is already running.
    #[error("watch service already running")]
    AlreadyRunning,

    /// The service is not running.
    #[error("watch service not running")]
    NotRunning,

    /// The notification backend reported an error.
    #[error("watch backend error")]
    Backend(#[from] notify::Error),
}

/// Result type for watch service operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Configuration for a [`WatchService`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directories to watch, recursively.
    pub roots: Vec<PathBuf>,

    /// Quiet period a path must observe before its change is emitted.
    pub debounce: Duration,

    /// Paths matching any of these patterns are never emitted.
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            debounce: DEFAULT_DEBOUNCE,
            ignore_patterns: Vec::new(),
        }
    }
}

impl WatchOptions {
    /// Create options for the given roots with default debounce and no
    /// ignore patterns.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }
}

/// A debounced, recursive directory watcher.
///
/// Dropping a running service stops it.
pub struct WatchService {
    options: WatchOptions,
    watcher: Option<RecommendedWatcher>,
    thread: Option<thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for WatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchService")
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WatchService {
    /// Create a stopped service with the given options.
    #[must_use]
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            watcher: None,
            thread: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the service is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start watching and return the change stream.
    ///
    /// # Errors
    ///
    /// Fails if the service is already running, if no roots are configured,
    /// if a root is missing or not a directory, or if the notification
    /// backend refuses a registration.
    pub fn start(&mut self) -> Result<tokio::sync::mpsc::Receiver<FileChange>> {
        if self.is_running() {
            return Err(WatchError::AlreadyRunning);
        }
        if self.options.roots.is_empty() {
            return Err(WatchError::StartFailed("no roots to watch".to_string()));
        }
        for root in &self.options.roots {
            if !root.is_dir() {
                return Err(WatchError::StartFailed(format!(
                    "not a directory: {}",
                    root.display()
                )));
            }
        }

        let (raw_tx, raw_rx) = mpsc::channel();
        let patterns = self.options.ignore_patterns.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    for change in FileChange::from_notify(&event) {
                        if is_ignored(change.path(), &patterns) {
                            trace!(path = %change.path().display(), "ignored change");
                            continue;
                        }
                        // Receiver gone means the service is shutting down.
                        if raw_tx.send(change).is_err() {
                            break;
                        }
                    }
                }
                Err(err) => warn!("watch backend error: {err}"),
            },
            notify::Config::default(),
        )?;
        for root in &self.options.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            debug!(root = %root.display(), "watching");
        }

        let (tx, rx) = tokio::sync::mpsc::channel(EVENT_BUFFER);
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let window = self.options.debounce;
        let thread = thread::Builder::new()
            .name("esdown-watch".to_string())
            .spawn(move || debounce_loop(&raw_rx, &tx, window, &running))
            .map_err(|e| WatchError::StartFailed(e.to_string()))?;

        self.watcher = Some(watcher);
        self.thread = Some(thread);
        Ok(rx)
    }

    /// Stop watching. Stopping a stopped service is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the debounce thread panicked.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the backend watcher closes the raw channel, which also
        // wakes the debounce thread.
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| WatchError::StopFailed("debounce thread panicked".to_string()))?;
        }
        Ok(())
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("watch service shutdown: {err}");
        }
    }
}

/// Collapse event bursts: keep only the newest change per path, and emit it
/// once the path has been quiet for the debounce window.
fn debounce_loop(
    raw_rx: &mpsc::Receiver<FileChange>,
    tx: &tokio::sync::mpsc::Sender<FileChange>,
    window: Duration,
    running: &AtomicBool,
) {
    let mut pending: HashMap<PathBuf, (FileChange, Instant)> = HashMap::new();

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        match raw_rx.recv_timeout(POLL_INTERVAL) {
            Ok(change) => {
                trace!(path = %change.path().display(), kind = change.kind(), "queued");
                pending.insert(change.path().to_path_buf(), (change, Instant::now()));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, (_, seen))| now.duration_since(*seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ready {
            if let Some((change, _)) = pending.remove(&path) {
                debug!(path = %path.display(), kind = change.kind(), "change");
                if tx.blocking_send(change).is_err() {
                    // Receiver dropped; nothing left to deliver to.
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            }
        }
    }
    running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    fn short_debounce(roots: Vec<PathBuf>) -> WatchOptions {
        WatchOptions {
            roots,
            debounce: Duration::from_millis(100),
            ignore_patterns: Vec::new(),
        }
    }

    #[test]
    fn test_options_default() {
        let options = WatchOptions::default();
        assert!(options.roots.is_empty());
        assert_eq!(options.debounce, DEFAULT_DEBOUNCE);
        assert!(options.ignore_patterns.is_empty());
    }

    #[test]
    fn test_start_without_roots_fails() {
        let mut service = WatchService::new(WatchOptions::default());
        let err = service.start().unwrap_err();
        assert!(matches!(err, WatchError::StartFailed(_)));
        assert!(!service.is_running());
    }

    #[test]
    fn test_start_with_missing_root_fails() {
        let options = WatchOptions::new(vec![PathBuf::from("/definitely/not/here/esdown")]);
        let mut service = WatchService::new(options);
        let err = service.start().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_double_start_fails() {
        let dir = TempDir::new().unwrap();
        let mut service = WatchService::new(short_debounce(vec![dir.path().to_path_buf()]));
        let _rx = service.start().unwrap();
        assert!(service.is_running());

        let err = service.start().unwrap_err();
        assert!(matches!(err, WatchError::AlreadyRunning));

        service.stop().unwrap();
        assert!(!service.is_running());
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut service = WatchService::new(WatchOptions::default());
        service.stop().unwrap();
        service.stop().unwrap();
    }

    #[test]
    fn test_error_display() {
        assert!(WatchError::StartFailed("x".to_string())
            .to_string()
            .contains("start"));
        assert!(WatchError::AlreadyRunning
            .to_string()
            .contains("already running"));
        assert!(WatchError::NotRunning.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_receives_change_for_new_file() {
        let dir = TempDir::new().unwrap();
        let mut service = WatchService::new(short_debounce(vec![dir.path().to_path_buf()]));
        let mut rx = service.start().unwrap();

        fs::write(dir.path().join("hello.js"), "var x = 1;").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change within timeout")
            .expect("stream open");
        assert!(change.path().ends_with("hello.js"));
        assert!(matches!(
            change,
            FileChange::Created(_) | FileChange::Modified(_)
        ));

        service.stop().unwrap();
    }

    #[tokio::test]
    async fn test_ignored_paths_are_not_emitted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let options = WatchOptions {
            roots: vec![dir.path().to_path_buf()],
            debounce: Duration::from_millis(100),
            ignore_patterns: vec!["**/node_modules/**".to_string()],
        };
        let mut service = WatchService::new(options);
        let mut rx = service.start().unwrap();

        fs::write(dir.path().join("node_modules").join("dep.js"), "x").unwrap();
        fs::write(dir.path().join("app.js"), "var x = 1;").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change within timeout")
            .expect("stream open");
        assert!(change.path().ends_with("app.js"));

        service.stop().unwrap();
    }

    #[tokio::test]
    async fn test_burst_collapses_to_single_change() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("busy.js");
        let mut service = WatchService::new(short_debounce(vec![dir.path().to_path_buf()]));
        let mut rx = service.start().unwrap();

        for i in 0..5 {
            fs::write(&file, format!("var x = {i};")).unwrap();
        }

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change within timeout")
            .expect("stream open");
        assert!(first.path().ends_with("busy.js"));

        // The burst happened well inside one debounce window, so no further
        // change for this path should be pending.
        let extra = tokio::time::timeout(Duration::from_millis(400), rx.recv()).await;
        assert!(extra.is_err(), "expected a single debounced change");

        service.stop().unwrap();
    }
}
