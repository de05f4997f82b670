//! Configuration management for esdown.
//!
//! This module provides configuration loading and validation using figment,
//! supporting a project-local TOML file, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the project directory.
const CONFIG_FILE_NAME: &str = "esdown.toml";

/// Directory name used under the user cache dir for provisioned tools.
const TOOLS_DIR_NAME: &str = "esdown";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ESDOWN_`)
/// 2. `esdown.toml` in the project directory (path overridable)
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Asset layout configuration.
    pub assets: AssetsConfig,
    /// Compiler configuration.
    pub compiler: CompilerConfig,
    /// Watch mode configuration.
    pub watch: WatchConfig,
    /// Compile cache configuration.
    pub cache: CacheConfig,
    /// Tool provisioning configuration.
    pub tools: ToolsConfig,
}

/// Where asset sources live and where compiled outputs go.
///
/// Internal assets ship inside the application archive; external assets are
/// served as-is. Both roots are resolved relative to the project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Source root for internal assets.
    pub internal_dir: PathBuf,
    /// Source root for external assets.
    pub external_dir: PathBuf,
    /// Output root for compiled internal assets.
    pub internal_output: PathBuf,
    /// Output root for compiled external assets.
    pub external_output: PathBuf,
    /// File extensions (without the dot) the pipeline compiles.
    pub extensions: Vec<String>,
    /// Paths matching any of these patterns are never compiled or watched.
    pub exclude: Vec<String>,
}

/// Compiler-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// The Traceur npm release to provision.
    pub version: String,
    /// Module strategy forwarded to Traceur as `--modules=<strategy>`.
    pub module_strategy: Option<String>,
}

/// Watch mode configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window for file change events, in milliseconds.
    pub debounce_ms: u64,
}

/// Compile cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether the compile cache is consulted at all.
    pub enabled: bool,
    /// Path to the cache database.
    /// Defaults to `target/esdown/cache.db` under the project directory.
    pub path: Option<PathBuf>,
}

/// Tool provisioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// The npm executable to invoke.
    pub npm_binary: String,
    /// Directory npm packages are provisioned into.
    /// Defaults to `esdown/tools` under the user cache directory.
    pub dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            internal_dir: PathBuf::from("src/main/resources/assets"),
            external_dir: PathBuf::from("src/main/assets"),
            internal_output: PathBuf::from("target/classes/assets"),
            external_output: PathBuf::from("target/assets"),
            extensions: default_extensions(),
            exclude: default_excludes(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: crate::compiler::DEFAULT_TRACEUR_VERSION.to_string(),
            module_strategy: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 250 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None, // Resolved against the project directory at runtime
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            npm_binary: "npm".to_string(),
            dir: None, // Resolved against the user cache directory at runtime
        }
    }
}

/// Default input extensions.
fn default_extensions() -> Vec<String> {
    vec!["js".to_string()]
}

/// Default exclude patterns.
fn default_excludes() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        "**/*.min.js".to_string(),
    ]
}

impl Config {
    /// Load configuration for a project from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing, or validation
    /// fails.
    pub fn load(project_dir: &Path) -> Result<Self> {
        Self::load_from(project_dir, None)
    }

    /// Load configuration with an optional custom config file path.
    ///
    /// Sources are merged in this order (later sources override earlier):
    /// 1. Default values
    /// 2. The TOML config file (if it exists)
    /// 3. Environment variables (prefixed with `ESDOWN_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing, or validation
    /// fails.
    pub fn load_from(project_dir: &Path, config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(|| Self::config_path_for(project_dir));

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("ESDOWN_").split("_"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The default config file location for a project.
    #[must_use]
    pub fn config_path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.watch.debounce_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "debounce_ms must be greater than 0".to_string(),
            });
        }

        if self.assets.extensions.is_empty() {
            return Err(Error::ConfigValidation {
                message: "extensions must not be empty".to_string(),
            });
        }
        for extension in &self.assets.extensions {
            if extension.is_empty() || extension.starts_with('.') {
                return Err(Error::ConfigValidation {
                    message: format!(
                        "extensions are written without the dot, got '{extension}'"
                    ),
                });
            }
        }

        if self.compiler.version.is_empty() {
            return Err(Error::ConfigValidation {
                message: "compiler version must not be empty".to_string(),
            });
        }
        if let Some(strategy) = &self.compiler.module_strategy {
            if strategy.is_empty() || strategy.chars().any(char::is_whitespace) {
                return Err(Error::ConfigValidation {
                    message: format!("invalid module strategy '{strategy}'"),
                });
            }
        }

        if self.tools.npm_binary.is_empty() {
            return Err(Error::ConfigValidation {
                message: "npm_binary must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the cache database path, resolving the default against the
    /// project directory.
    #[must_use]
    pub fn cache_path(&self, project_dir: &Path) -> PathBuf {
        self.cache.path.clone().unwrap_or_else(|| {
            project_dir
                .join("target")
                .join("esdown")
                .join("cache.db")
        })
    }

    /// Get the tool provisioning directory, resolving the default against
    /// the user cache directory.
    #[must_use]
    pub fn tools_dir(&self) -> PathBuf {
        self.tools.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join(TOOLS_DIR_NAME)
                .join("tools")
        })
    }

    /// Get the watch debounce window as a Duration.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}
