//! The per-file watcher contract.
//!
//! A [`Watcher`] is the thing that actually reacts to file changes: it
//! declares which paths it handles via [`Watcher::accept`] and is then called
//! back for creations, modifications, and deletions. Failures are reported as
//! [`WatchingError`], which can carry the offending file and position so
//! callers can render useful diagnostics.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error};

use crate::event::FileChange;

/// A failure while handling a file change.
///
/// Built incrementally: start from a title and message, then attach the file,
/// the position, and the underlying cause as they become known.
#[derive(Debug, Error)]
#[error("{title}: {message}")]
pub struct WatchingError {
    title: String,
    message: String,
    file: Option<PathBuf>,
    line: Option<u32>,
    column: Option<u32>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl WatchingError {
    /// Create an error with a title and message.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            file: None,
            line: None,
            column: None,
            source: None,
        }
    }

    /// Attach the file the error applies to.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a 1-based line and column.
    #[must_use]
    pub fn at_position(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The error title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The file the error applies to, when known.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// The 1-based line, when known.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// The 1-based column, when known.
    #[must_use]
    pub fn column(&self) -> Option<u32> {
        self.column
    }

    /// Line and column together, when both are known.
    #[must_use]
    pub fn position(&self) -> Option<(u32, u32)> {
        self.line.zip(self.column)
    }
}

/// A handler for changes to files it accepts.
///
/// `on_modified` handling is conventionally the same as `on_created`;
/// implementors that treat updates identically can delegate one to the other.
/// The returned `bool` reports whether the change was actually handled.
#[async_trait::async_trait(?Send)]
pub trait Watcher: Send {
    /// Whether this watcher handles the given path.
    fn accept(&self, path: &Path) -> bool;

    /// Called when an accepted file is created.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchingError`] when handling the new file fails.
    async fn on_created(&mut self, path: &Path) -> Result<bool, WatchingError>;

    /// Called when an accepted file is modified.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchingError`] when handling the update fails.
    async fn on_modified(&mut self, path: &Path) -> Result<bool, WatchingError>;

    /// Called when an accepted file is deleted.
    ///
    /// # Errors
    ///
    /// Returns a [`WatchingError`] when cleaning up after the file fails.
    async fn on_deleted(&mut self, path: &Path) -> Result<bool, WatchingError>;
}

/// Counts of what a dispatch loop saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Changes a callback handled successfully.
    pub handled: u64,

    /// Changes whose callback failed.
    pub failed: u64,

    /// Changes the watcher did not accept.
    pub skipped: u64,
}

/// Drive a [`Watcher`] from a change stream until the stream ends.
///
/// Callback failures are logged, with position information when present, and
/// the loop keeps going: one broken file must not stop a watch session.
pub async fn dispatch<W: Watcher>(
    mut changes: Receiver<FileChange>,
    watcher: &mut W,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    while let Some(change) = changes.recv().await {
        let path = change.path();
        if !watcher.accept(path) {
            debug!(path = %path.display(), "not accepted");
            summary.skipped += 1;
            continue;
        }

        let result = match change {
            FileChange::Created(ref path) => watcher.on_created(path).await,
            FileChange::Modified(ref path) => watcher.on_modified(path).await,
            FileChange::Deleted(ref path) => watcher.on_deleted(path).await,
        };

        match result {
            Ok(handled) => {
                if handled {
                    summary.handled += 1;
                }
                debug!(path = %change.path().display(), kind = change.kind(), handled, "dispatched");
            }
            Err(err) => {
                summary.failed += 1;
                let file = err.file().unwrap_or(change.path());
                if let Some((line, column)) = err.position() {
                    error!("{err} [{}:{line}:{column}]", file.display());
                } else {
                    error!("{err} [{}]", file.display());
                }
            }
        }
    }

    summary
}
