//! `esdown` - a watch-mode EcmaScript 6 to EcmaScript 5 asset compiler
//!
//! This library compiles a project's EcmaScript 6 assets to EcmaScript 5 by
//! driving the Traceur compiler, provisioned on demand through npm. Assets
//! live under two source roots (internal assets bundled with the application,
//! external assets served as-is), compiled outputs mirror the source layout,
//! and a content-addressed cache keeps rebuilds cheap. In watch mode the
//! pipeline recompiles files as they change.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod assets;
pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod logging;
pub mod npm;
pub mod pipeline;

pub use assets::{AssetKind, AssetLayout, AssetRoot};
pub use cache::{CacheEntry, CacheStats, CompileCache};
pub use compiler::TraceurCompiler;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use npm::{CommandRunner, Npm, SystemRunner, ToolOutput};
pub use pipeline::{BuildReport, Pipeline};
