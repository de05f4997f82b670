//! Asset roots and source-to-output path mapping.
//!
//! A project has two asset roots: internal assets, which ship inside the
//! application archive, and external assets, which are served as-is next to
//! it. Each root maps its sources onto a parallel output tree, with compiled
//! files renamed to the output extension.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::config::AssetsConfig;

/// Extension given to compiled outputs.
const OUTPUT_EXTENSION: &str = "js";

/// Which of the two asset trees a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Assets packaged inside the application archive.
    Internal,
    /// Assets served as-is next to the application.
    External,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// A single asset root: a source directory and its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRoot {
    kind: AssetKind,
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl AssetRoot {
    /// The kind of assets under this root.
    #[must_use]
    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    /// The directory sources are read from.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// The directory compiled outputs are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// The resolved asset layout of a project.
///
/// Directories are resolved against the project directory. With an absolute
/// project directory, paths coming from the file watcher classify directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    roots: Vec<AssetRoot>,
}

impl AssetLayout {
    /// Resolve the asset layout for a project.
    #[must_use]
    pub fn from_config(project_dir: &Path, assets: &AssetsConfig) -> Self {
        let roots = vec![
            AssetRoot {
                kind: AssetKind::Internal,
                source_dir: project_dir.join(&assets.internal_dir),
                output_dir: project_dir.join(&assets.internal_output),
            },
            AssetRoot {
                kind: AssetKind::External,
                source_dir: project_dir.join(&assets.external_dir),
                output_dir: project_dir.join(&assets.external_output),
            },
        ];
        Self { roots }
    }

    /// All asset roots, internal first.
    #[must_use]
    pub fn roots(&self) -> &[AssetRoot] {
        &self.roots
    }

    /// Find the root a source file belongs to, along with its path relative
    /// to that root. Returns `None` for paths outside every root.
    #[must_use]
    pub fn classify<'a>(&self, path: &'a Path) -> Option<(&AssetRoot, &'a Path)> {
        self.roots.iter().find_map(|root| {
            path.strip_prefix(&root.source_dir)
                .ok()
                .map(|relative| (root, relative))
        })
    }

    /// The location in the output tree corresponding to a source file,
    /// keeping the file name unchanged.
    fn mapped(&self, path: &Path) -> Option<PathBuf> {
        let (root, relative) = self.classify(path)?;
        Some(root.output_dir.join(relative))
    }

    /// Where the compiled form of a source file goes.
    ///
    /// The relative path is preserved and the extension is rewritten, so
    /// `doc/app.es6` compiles to `doc/app.js` while `doc/hello.es6.js`
    /// keeps its name.
    #[must_use]
    pub fn output_path(&self, path: &Path) -> Option<PathBuf> {
        let mut output = self.mapped(path)?;
        output.set_extension(OUTPUT_EXTENSION);
        Some(output)
    }

    /// Look for an already-processed copy of a source file in the output
    /// tree, under the same relative path and name.
    ///
    /// When a build step has placed a filtered copy there, that copy is the
    /// one to compile. Returns `None` when no such copy exists.
    #[must_use]
    pub fn filtered_version(&self, path: &Path) -> Option<PathBuf> {
        let candidate = self.mapped(path)?;
        candidate.is_file().then_some(candidate)
    }

    /// Walk every asset root and collect the source files `accept` keeps.
    ///
    /// Entries are visited in file-name order within each directory, internal
    /// root first. Roots that do not exist yield nothing.
    pub fn scan<F>(&self, accept: F) -> Vec<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let mut sources = Vec::new();
        for root in &self.roots {
            if !root.source_dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root.source_dir).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(
                            "skipping unreadable entry under {}: {err}",
                            root.source_dir.display()
                        );
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.into_path();
                if accept(&path) {
                    sources.push(path);
                }
            }
        }
        sources
    }
}
