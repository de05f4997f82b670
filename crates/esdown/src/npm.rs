//! npm-based tool provisioning.
//!
//! Compiler tools are npm packages installed into a private tools directory,
//! so builds never touch a project's own `node_modules`. Process execution
//! sits behind [`CommandRunner`] so tests can script tool behavior instead
//! of spawning real processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Shown when npm cannot be found on the system.
const INSTALL_INSTRUCTIONS: &str = "Install Node.js (which bundles npm) from \
     https://nodejs.org/, or point tools.npm_binary at an npm executable.";

/// What running a tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Whether the process exited successfully.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs external commands.
///
/// [`SystemRunner`] is the real implementation; tests substitute scripted
/// runners.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing its output.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be launched. A process that
    /// launches and exits non-zero is not an error here; callers inspect
    /// [`ToolOutput::success`].
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput>;
}

/// [`CommandRunner`] backed by real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|err| Error::tool_launch(program.display().to_string(), err))?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Provisions npm packages into a tools directory and runs their binaries.
pub struct Npm {
    binary: String,
    tools_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for Npm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Npm")
            .field("binary", &self.binary)
            .field("tools_dir", &self.tools_dir)
            .finish_non_exhaustive()
    }
}

impl Npm {
    /// Create a provisioner that runs real processes.
    pub fn new(binary: impl Into<String>, tools_dir: impl Into<PathBuf>) -> Self {
        Self::with_runner(binary, tools_dir, Arc::new(SystemRunner))
    }

    /// Create a provisioner with a custom command runner.
    pub fn with_runner(
        binary: impl Into<String>,
        tools_dir: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            tools_dir: tools_dir.into(),
            runner,
        }
    }

    /// The directory packages are provisioned into.
    #[must_use]
    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    /// Where a provisioned package lives.
    #[must_use]
    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.tools_dir.join("node_modules").join(package)
    }

    /// Where npm links a provisioned package's executable.
    #[must_use]
    pub fn binary_path(&self, name: &str) -> PathBuf {
        self.tools_dir.join("node_modules").join(".bin").join(name)
    }

    /// Check that the configured npm executable works, returning its version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NpmNotFound`] with install instructions when the
    /// executable does not exist, and other errors when it cannot be run.
    pub async fn ensure_available(&self) -> Result<String> {
        let args = vec!["--version".to_string()];
        match self.runner.run(Path::new(&self.binary), &args).await {
            Ok(output) if output.success => {
                let version = output.stdout.trim().to_string();
                debug!("npm {version} at '{}'", self.binary);
                Ok(version)
            }
            Ok(output) => Err(Error::internal(format!(
                "'{} --version' failed: {}",
                self.binary,
                first_line(&output.stderr)
            ))),
            Err(Error::ToolLaunch { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Err(Error::npm_not_found(INSTALL_INSTRUCTIONS))
            }
            Err(err) => Err(err),
        }
    }

    /// Make sure `package` is provisioned at exactly `version`, installing
    /// or replacing it as needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the tools directory cannot be created, npm
    /// cannot be launched, or the install fails.
    pub async fn ensure_installed(&self, package: &str, version: &str) -> Result<()> {
        if let Some(installed) = self.installed_version(package) {
            if installed == version {
                debug!("{package}@{version} already provisioned");
                return Ok(());
            }
            info!("replacing {package}@{installed} with {package}@{version}");
        }

        std::fs::create_dir_all(&self.tools_dir).map_err(|err| Error::DirectoryCreate {
            path: self.tools_dir.clone(),
            source: err,
        })?;

        info!(
            "installing {package}@{version} into {}",
            self.tools_dir.display()
        );
        let args = vec![
            "install".to_string(),
            format!("{package}@{version}"),
            "--prefix".to_string(),
            self.tools_dir.display().to_string(),
            "--no-audit".to_string(),
            "--no-fund".to_string(),
            "--loglevel".to_string(),
            "error".to_string(),
        ];
        let output = self.runner.run(Path::new(&self.binary), &args).await?;
        if !output.success {
            return Err(Error::package_install(
                package,
                version,
                first_line(&output.stderr),
            ));
        }
        if !self.package_dir(package).is_dir() {
            return Err(Error::package_install(
                package,
                version,
                "package directory missing after install",
            ));
        }
        Ok(())
    }

    /// Run a provisioned package's executable.
    ///
    /// # Errors
    ///
    /// Returns an error when the executable cannot be launched.
    pub async fn execute(&self, binary_name: &str, args: &[String]) -> Result<ToolOutput> {
        let program = self.binary_path(binary_name);
        debug!("running {} {}", program.display(), args.join(" "));
        self.runner.run(&program, args).await
    }

    /// The version of an already-provisioned package, read from its
    /// manifest. `None` when the package is absent or its manifest is
    /// unreadable, which both mean a fresh install is needed.
    fn installed_version(&self, package: &str) -> Option<String> {
        let manifest = self.package_dir(package).join("package.json");
        let contents = std::fs::read_to_string(&manifest).ok()?;
        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(json) => json
                .get("version")
                .and_then(|version| version.as_str())
                .map(str::to_string),
            Err(err) => {
                warn!("unreadable manifest at {}: {err}", manifest.display());
                None
            }
        }
    }
}

/// The first non-blank line of tool output, for one-line error messages.
fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
}
