//! The Traceur compiler front-end.
//!
//! Traceur is an npm package whose binary rewrites EcmaScript 6 sources into
//! EcmaScript 5. This module provisions a pinned release through [`Npm`] and
//! turns failed runs into structured diagnostics.

use std::path::Path;

use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::diagnostic;
use crate::error::{Error, Result};
use crate::npm::Npm;

/// The npm package providing the compiler.
pub const TRACEUR_PACKAGE: &str = "traceur";

/// The Traceur release provisioned when none is configured.
pub const DEFAULT_TRACEUR_VERSION: &str = "0.0.49";

/// Name of the executable npm links for the package.
const TRACEUR_BINARY: &str = "traceur";

/// Compiles EcmaScript 6 sources by invoking a provisioned Traceur.
#[derive(Debug)]
pub struct TraceurCompiler {
    npm: Npm,
    version: String,
    module_strategy: Option<String>,
}

impl TraceurCompiler {
    /// Create a compiler using the given provisioner and configuration.
    #[must_use]
    pub fn new(npm: Npm, config: &CompilerConfig) -> Self {
        Self {
            npm,
            version: config.version.clone(),
            module_strategy: config.module_strategy.clone(),
        }
    }

    /// The Traceur release this compiler provisions and runs.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Make sure npm works and the pinned Traceur release is installed.
    ///
    /// # Errors
    ///
    /// Returns an error when npm is missing or the install fails.
    pub async fn prepare(&self) -> Result<()> {
        self.npm.ensure_available().await?;
        self.npm
            .ensure_installed(TRACEUR_PACKAGE, &self.version)
            .await
    }

    /// Compile `script` into `output`, creating output directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compilation`] with a parsed diagnostic when Traceur
    /// rejects the script, and other errors when it cannot be run at all.
    pub async fn compile(&self, script: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|err| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source: err,
            })?;
        }

        let mut args = Vec::new();
        if let Some(strategy) = &self.module_strategy {
            args.push(format!("--modules={strategy}"));
        }
        args.push("--out".to_string());
        args.push(output.display().to_string());
        args.push("--script".to_string());
        args.push(script.display().to_string());

        debug!("compiling {} -> {}", script.display(), output.display());
        let result = self.npm.execute(TRACEUR_BINARY, &args).await?;
        if result.success {
            info!("compiled {} to {}", script.display(), output.display());
            Ok(())
        } else {
            Err(Error::Compilation(diagnostic::parse(
                &result.stderr,
                script,
            )))
        }
    }
}
