//! Error types for esdown.
//!
//! This module defines all error types used throughout the esdown crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;

use esdown_watch::{WatchError, WatchingError};
use thiserror::Error;

/// The main error type for esdown operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Tool Errors ===
    /// The npm executable could not be found.
    #[error("npm executable not found. {instructions}")]
    NpmNotFound {
        /// Instructions for making npm available.
        instructions: String,
    },

    /// Installing an npm package failed.
    #[error("failed to install {package}@{version}: {message}")]
    PackageInstall {
        /// The npm package name.
        package: String,
        /// The requested package version.
        version: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A provisioned tool failed to launch.
    #[error("failed to launch '{tool}': {source}")]
    ToolLaunch {
        /// Name of the tool binary.
        tool: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Compilation Errors ===
    /// Compiling an asset failed.
    #[error("{0}")]
    Compilation(#[from] WatchingError),

    // === Watch Errors ===
    /// The watch service failed.
    #[error("watch service error: {0}")]
    Watch(#[from] WatchError),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Cache Errors ===
    /// Failed to open or create the compile cache database.
    #[error("failed to open cache at {path}: {source}")]
    CacheOpen {
        /// Path to the cache database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A compile cache query failed.
    #[error("cache query failed: {0}")]
    CacheQuery(#[from] rusqlite::Error),

    // === Asset Errors ===
    /// A path is not under any configured asset source root.
    #[error("no asset root maps {path}")]
    UnmappedAsset {
        /// The path that could not be mapped.
        path: PathBuf,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for esdown operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create an npm-not-found error with instructions.
    #[must_use]
    pub fn npm_not_found(instructions: impl Into<String>) -> Self {
        Self::NpmNotFound {
            instructions: instructions.into(),
        }
    }

    /// Create a package installation error.
    #[must_use]
    pub fn package_install(
        package: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::PackageInstall {
            package: package.into(),
            version: version.into(),
            message: message.into(),
        }
    }

    /// Create a tool launch error.
    #[must_use]
    pub fn tool_launch(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::ToolLaunch {
            tool: tool.into(),
            source,
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a compilation failure.
    #[must_use]
    pub fn is_compilation(&self) -> bool {
        matches!(self, Self::Compilation(_))
    }

    /// Check if this error indicates npm is missing.
    #[must_use]
    pub fn is_npm_missing(&self) -> bool {
        matches!(self, Self::NpmNotFound { .. })
    }
}
