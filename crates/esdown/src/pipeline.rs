//! The compile pipeline.
//!
//! A [`Pipeline`] decides what happens when a script asset appears, changes,
//! or disappears: it maps the source through the asset layout, prefers an
//! already-filtered copy of the file when one exists, consults the compile
//! cache, and drives the Traceur compiler. It implements [`Watcher`] so the
//! same logic serves both one-shot builds and watch mode.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use esdown_watch::{is_ignored, Watcher, WatchingError};

use crate::assets::AssetLayout;
use crate::cache::{self, CacheStats, CompileCache};
use crate::compiler::TraceurCompiler;
use crate::config::Config;
use crate::error::{Error, Result};

/// What a full build did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Source files considered.
    pub scanned: usize,
    /// Files actually compiled.
    pub compiled: usize,
    /// Files whose output was already up to date.
    pub skipped: usize,
}

/// What processing one source did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Compiled,
    Fresh,
}

/// Compiles script assets from the source trees into the output trees.
#[derive(Debug)]
pub struct Pipeline {
    layout: AssetLayout,
    compiler: TraceurCompiler,
    cache: Option<CompileCache>,
    extensions: Vec<String>,
    exclude: Vec<String>,
    force: bool,
}

impl Pipeline {
    /// Create a pipeline for a project.
    ///
    /// A cache that cannot be opened is logged and disabled rather than
    /// failing the build; compilation works without it.
    #[must_use]
    pub fn new(config: &Config, project_dir: &Path, compiler: TraceurCompiler) -> Self {
        let layout = AssetLayout::from_config(project_dir, &config.assets);
        let cache = if config.cache.enabled {
            match CompileCache::open(config.cache_path(project_dir)) {
                Ok(cache) => Some(cache),
                Err(err) => {
                    warn!("compile cache unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Self {
            layout,
            compiler,
            cache,
            extensions: config.assets.extensions.clone(),
            exclude: config.assets.exclude.clone(),
            force: false,
        }
    }

    /// Recompile everything, ignoring cache freshness.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The resolved asset layout.
    #[must_use]
    pub fn layout(&self) -> &AssetLayout {
        &self.layout
    }

    /// Whether the pipeline compiles this path.
    #[must_use]
    pub fn accept(&self, path: &Path) -> bool {
        if is_ignored(path, &self.exclude) {
            return false;
        }
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.iter().any(|accepted| accepted == extension) {
            return false;
        }
        self.layout.classify(path).is_some()
    }

    /// Provision the compiler toolchain.
    ///
    /// # Errors
    ///
    /// Returns an error when npm is missing or the compiler install fails.
    pub async fn prepare(&self) -> Result<()> {
        self.compiler.prepare().await
    }

    /// Compile every accepted source under the asset roots.
    ///
    /// Stops at the first failure: a one-shot build must not paper over a
    /// broken file the way a watch session does.
    ///
    /// # Errors
    ///
    /// Returns the first compilation or I/O failure.
    pub async fn build_all(&self) -> Result<BuildReport> {
        let sources = self.layout.scan(|path| self.accept(path));
        let mut report = BuildReport {
            scanned: sources.len(),
            compiled: 0,
            skipped: 0,
        };

        for source in &sources {
            match self.process(source).await? {
                Outcome::Compiled => report.compiled += 1,
                Outcome::Fresh => report.skipped += 1,
            }
        }

        info!(
            "build complete: {} compiled, {} up to date",
            report.compiled, report.skipped
        );
        Ok(report)
    }

    /// Delete compiled outputs, returning how many files were removed.
    ///
    /// Outputs are deleted one by one rather than wiping the output
    /// directories, which can hold files owned by other build steps. The
    /// set covers outputs mapped from present sources plus any recorded in
    /// the cache for sources that are already gone.
    ///
    /// # Errors
    ///
    /// Returns an error when a file cannot be deleted or the cache cannot
    /// be read.
    pub fn clean(&self, keep_cache: bool) -> Result<usize> {
        let mut targets: Vec<PathBuf> = self
            .layout
            .scan(|path| self.accept(path))
            .iter()
            .filter_map(|source| self.layout.output_path(source))
            .collect();

        if let Some(cache) = &self.cache {
            for entry in cache.entries()? {
                targets.push(entry.output_path);
            }
        }

        targets.sort();
        targets.dedup();

        let mut deleted = 0;
        for target in targets {
            if target.exists() {
                std::fs::remove_file(&target)?;
                deleted += 1;
                debug!("deleted {}", target.display());
            }
        }

        if !keep_cache {
            if let Some(cache) = &self.cache {
                cache.clear()?;
            }
        }

        info!("clean removed {} compiled files", deleted);
        Ok(deleted)
    }

    /// Cache statistics, when the cache is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read.
    pub fn cache_stats(&self) -> Result<Option<CacheStats>> {
        self.cache.as_ref().map(CompileCache::stats).transpose()
    }

    /// Compile one source file into its output location.
    async fn process(&self, source: &Path) -> Result<Outcome> {
        let output = self
            .layout
            .output_path(source)
            .ok_or_else(|| Error::UnmappedAsset {
                path: source.to_path_buf(),
            })?;

        let script = self.script_for(source);
        let script_bytes = std::fs::read(&script)?;
        let script_fingerprint = cache::fingerprint(&script_bytes);

        if !self.force {
            if let Some(cache) = &self.cache {
                if cache.is_fresh(source, &script_fingerprint, self.compiler.version())? {
                    debug!("{} is up to date", source.display());
                    return Ok(Outcome::Fresh);
                }
            }
        }

        self.compiler.compile(&script, &output).await?;

        if let Some(cache) = &self.cache {
            if let Err(err) = Self::record_compilation(
                cache,
                source,
                &script_fingerprint,
                &output,
                self.compiler.version(),
            ) {
                warn!("failed to record compilation: {err}");
            }
        }

        Ok(Outcome::Compiled)
    }

    fn record_compilation(
        cache: &CompileCache,
        source: &Path,
        script_fingerprint: &str,
        output: &Path,
        compiler_version: &str,
    ) -> Result<()> {
        let output_bytes = std::fs::read(output)?;
        cache.record(
            source,
            script_fingerprint,
            output,
            &cache::fingerprint(&output_bytes),
            compiler_version,
        )
    }

    /// The file to actually feed the compiler: the filtered copy of the
    /// source when one exists, otherwise the source itself.
    fn script_for(&self, source: &Path) -> PathBuf {
        if let Some(filtered) = self.layout.filtered_version(source) {
            if self.is_own_output(source, &filtered) {
                debug!("ignoring own output at {}", filtered.display());
            } else {
                return filtered;
            }
        }

        let name = source.file_name().unwrap_or(source.as_os_str());
        warn!(
            "Cannot find the filtered version of {}, using source file",
            name.to_string_lossy()
        );
        source.to_path_buf()
    }

    /// Whether a filtered-copy candidate is really our own output from an
    /// earlier run. For `.js` sources the filtered location and the output
    /// location coincide, and a previous output must not be fed back into
    /// the compiler.
    fn is_own_output(&self, source: &Path, candidate: &Path) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let entry = match cache.lookup(source) {
            Ok(Some(entry)) => entry,
            Ok(None) => return false,
            Err(err) => {
                warn!("cache lookup failed: {err}");
                return false;
            }
        };
        if entry.output_path != candidate {
            return false;
        }
        std::fs::read(candidate)
            .map(|bytes| cache::fingerprint(&bytes) == entry.output_fingerprint)
            .unwrap_or(false)
    }

    /// Delete the compiled output for a source, quietly.
    fn remove_output(&self, source: &Path) {
        if let Some(output) = self.layout.output_path(source) {
            if output.exists() {
                if let Err(err) = std::fs::remove_file(&output) {
                    warn!("failed to delete {}: {err}", output.display());
                } else {
                    info!("deleted {}", output.display());
                }
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.evict(source) {
                warn!("cache evict failed: {err}");
            }
        }
    }
}

/// Convert a pipeline failure into a watch diagnostic.
fn into_watching(err: Error, path: &Path) -> WatchingError {
    match err {
        Error::Compilation(watching) => watching,
        other => WatchingError::new(
            "Asset Processing Error",
            format!("error during the compilation of {}", path.display()),
        )
        .with_file(path)
        .with_source(other),
    }
}

#[async_trait::async_trait(?Send)]
impl Watcher for Pipeline {
    fn accept(&self, path: &Path) -> bool {
        Pipeline::accept(self, path)
    }

    async fn on_created(&mut self, path: &Path) -> std::result::Result<bool, WatchingError> {
        match self.process(path).await {
            Ok(_) => Ok(true),
            Err(err) => Err(into_watching(err, path)),
        }
    }

    async fn on_modified(&mut self, path: &Path) -> std::result::Result<bool, WatchingError> {
        self.on_created(path).await
    }

    async fn on_deleted(&mut self, path: &Path) -> std::result::Result<bool, WatchingError> {
        self.remove_output(path);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::npm::{CommandRunner, Npm, ToolOutput};

    /// Emulates the Traceur binary: reads the script, writes the output
    /// with a `"use strict"` prologue, and rejects scripts containing the
    /// marker text `syntax error`.
    struct FakeTraceur;

    #[async_trait::async_trait]
    impl CommandRunner for FakeTraceur {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<ToolOutput> {
            let out = arg_after(args, "--out");
            let script = arg_after(args, "--script");
            let source = std::fs::read_to_string(&script).unwrap();

            if source.contains("syntax error") {
                return Ok(ToolOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("[Error: {script}:10:9: Unexpected end of input\n"),
                });
            }

            std::fs::write(&out, format!("\"use strict\";\n{source}")).unwrap();
            Ok(ToolOutput {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn arg_after(args: &[String], flag: &str) -> String {
        let index = args.iter().position(|arg| arg == flag).unwrap();
        args[index + 1].clone()
    }

    fn make_pipeline_with(config: &Config, project: &Path) -> Pipeline {
        let npm = Npm::with_runner("npm", project.join("tools"), Arc::new(FakeTraceur));
        let compiler = TraceurCompiler::new(npm, &config.compiler);
        Pipeline::new(config, project, compiler)
    }

    fn make_pipeline(project: &Path) -> Pipeline {
        make_pipeline_with(&Config::default(), project)
    }

    fn write_source(project: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = project.join("src/main/resources/assets").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_accept_matrix() {
        let dir = tempfile::TempDir::new().unwrap();
        let pipeline = make_pipeline(dir.path());
        let root = dir.path().join("src/main/resources/assets");

        assert!(pipeline.accept(&root.join("doc/hello.js")));
        assert!(!pipeline.accept(&root.join("hello.markdown")));
        assert!(!pipeline.accept(&root.join("hello.asciidoc")));
        assert!(!pipeline.accept(&root.join("hello.html")));
        // Outside the asset roots.
        assert!(!pipeline.accept(&dir.path().join("src/main/java/Hello.js")));
        // Excluded by pattern.
        assert!(!pipeline.accept(&root.join("node_modules/lib/x.js")));
        assert!(!pipeline.accept(&root.join("app.min.js")));
    }

    #[tokio::test]
    async fn test_build_all_compiles() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "doc/hello.js", "class Greeter {}");
        let pipeline = make_pipeline(dir.path());

        let report = pipeline.build_all().await.unwrap();

        assert_eq!(
            report,
            BuildReport {
                scanned: 1,
                compiled: 1,
                skipped: 0
            }
        );
        let output = dir.path().join("target/classes/assets/doc/hello.js");
        let compiled = std::fs::read_to_string(&output).unwrap();
        assert!(compiled.contains("use strict"));
        assert!(compiled.contains("class Greeter"));
    }

    #[tokio::test]
    async fn test_build_all_skips_fresh() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "hello.js", "class A {}");
        let pipeline = make_pipeline(dir.path());

        pipeline.build_all().await.unwrap();
        let report = pipeline.build_all().await.unwrap();

        assert_eq!(report.compiled, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_build_all_recompiles_after_change() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "hello.js", "class A {}");
        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        write_source(dir.path(), "hello.js", "class B {}");
        let report = pipeline.build_all().await.unwrap();

        assert_eq!(report.compiled, 1);
        let output = dir.path().join("target/classes/assets/hello.js");
        let compiled = std::fs::read_to_string(&output).unwrap();
        assert!(compiled.contains("class B"));
        assert!(!compiled.contains("class A"));
        // Compiled from the edited source, not from the previous output.
        assert_eq!(compiled.matches("use strict").count(), 1);
    }

    #[tokio::test]
    async fn test_force_recompiles() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "hello.js", "class A {}");

        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();
        drop(pipeline);

        let forced = make_pipeline(dir.path()).with_force(true);
        let report = forced.build_all().await.unwrap();

        assert_eq!(report.compiled, 1);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_recompiles() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "hello.js", "class A {}");

        let mut config = Config::default();
        config.cache.enabled = false;
        let pipeline = make_pipeline_with(&config, dir.path());

        assert_eq!(pipeline.build_all().await.unwrap().compiled, 1);
        assert_eq!(pipeline.build_all().await.unwrap().compiled, 1);
    }

    #[tokio::test]
    async fn test_build_failure_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "bad.js", "syntax error here");
        let pipeline = make_pipeline(dir.path());

        let err = pipeline.build_all().await.unwrap_err();

        assert!(err.is_compilation());
        let Error::Compilation(diagnostic) = err else {
            panic!("expected a compilation error");
        };
        assert_eq!(diagnostic.position(), Some((10, 9)));
    }

    #[tokio::test]
    async fn test_filtered_copy_preferred() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "app.js", "var unfiltered = true;");

        // A build step already placed a filtered copy in the output tree.
        let filtered = dir.path().join("target/classes/assets/app.js");
        std::fs::create_dir_all(filtered.parent().unwrap()).unwrap();
        std::fs::write(&filtered, "var filtered = true;").unwrap();

        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        let compiled = std::fs::read_to_string(&filtered).unwrap();
        assert!(compiled.contains("var filtered"));
        assert!(!compiled.contains("var unfiltered"));
    }

    #[tokio::test]
    async fn test_extension_rewritten_in_output() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "app.es6", "let x = 1;");

        let mut config = Config::default();
        config.assets.extensions = vec!["es6".to_string()];
        let pipeline = make_pipeline_with(&config, dir.path());

        let report = pipeline.build_all().await.unwrap();

        assert_eq!(report.compiled, 1);
        assert!(dir.path().join("target/classes/assets/app.js").is_file());
        assert!(!dir.path().join("target/classes/assets/app.es6").exists());
    }

    #[tokio::test]
    async fn test_on_deleted_removes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = write_source(dir.path(), "hello.js", "class A {}");
        let mut pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        let output = dir.path().join("target/classes/assets/hello.js");
        assert!(output.exists());

        std::fs::remove_file(&source).unwrap();
        let handled = pipeline.on_deleted(&source).await.unwrap();

        assert!(handled);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_on_created_reports_diagnostic() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = write_source(dir.path(), "bad.js", "syntax error here");
        let mut pipeline = make_pipeline(dir.path());

        let err = pipeline.on_created(&source).await.unwrap_err();

        assert!(err.title().contains("Compilation"));
        assert_eq!(err.position(), Some((10, 9)));
    }

    #[tokio::test]
    async fn test_on_created_outside_roots() {
        let dir = tempfile::TempDir::new().unwrap();
        let stray = dir.path().join("stray.js");
        std::fs::write(&stray, "class A {}").unwrap();
        let mut pipeline = make_pipeline(dir.path());

        let err = pipeline.on_created(&stray).await.unwrap_err();

        assert_eq!(err.title(), "Asset Processing Error");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_clean_removes_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "a.js", "class A {}");
        write_source(dir.path(), "b.js", "class B {}");
        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        let deleted = pipeline.clean(false).unwrap();

        assert_eq!(deleted, 2);
        assert!(!dir.path().join("target/classes/assets/a.js").exists());
        assert!(!dir.path().join("target/classes/assets/b.js").exists());
        let stats = pipeline.cache_stats().unwrap().unwrap();
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_clean_keep_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        write_source(dir.path(), "a.js", "class A {}");
        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        pipeline.clean(true).unwrap();

        let stats = pipeline.cache_stats().unwrap().unwrap();
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_clean_covers_deleted_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = write_source(dir.path(), "gone.js", "class A {}");
        let pipeline = make_pipeline(dir.path());
        pipeline.build_all().await.unwrap();

        // The source disappears but its recorded output is still cleaned.
        std::fs::remove_file(&source).unwrap();
        let deleted = pipeline.clean(false).unwrap();

        assert_eq!(deleted, 1);
        assert!(!dir.path().join("target/classes/assets/gone.js").exists());
    }
}
