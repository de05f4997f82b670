//! `esdown-watch` - debounced file watching for asset pipelines
//!
//! This library turns raw file system notifications into a debounced stream of
//! [`FileChange`] events and defines the [`Watcher`] contract that asset
//! processors implement to react to them.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod event;
pub mod ignore;
pub mod service;
pub mod watcher;

pub use event::FileChange;
pub use ignore::is_ignored;
pub use service::{WatchError, WatchOptions, WatchService};
pub use watcher::{dispatch, DispatchSummary, Watcher, WatchingError};
