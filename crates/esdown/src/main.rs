//! `esdown` - EcmaScript 6 assets compiled as you save
//!
//! This binary provides the command-line interface for compiling a project's
//! script assets with Traceur and for recompiling them as they change on
//! disk.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use esdown::cli::{Cli, Command, ConfigCommand};
use esdown::{init_logging, AssetLayout, CompileCache, Config, Npm, Pipeline, TraceurCompiler};
use esdown_watch::{dispatch, WatchOptions, WatchService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let project = project_dir(&cli)?;

    // Execute the command
    match &cli.command {
        Command::Build(cmd) => handle_build(&cli, &project, cmd.force).await,
        Command::Watch(cmd) => handle_watch(&cli, &project, cmd.skip_initial).await,
        Command::Clean(cmd) => handle_clean(&cli, &project, cmd.keep_cache),
        Command::Status(cmd) => handle_status(&cli, &project, cmd.json),
        Command::Config(cmd) => handle_config(&cli, &project, cmd),
    }
}

/// Resolve the project directory to an absolute path. Watch backends report
/// absolute paths, so classification must run against absolute roots.
fn project_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
    if cli.project.is_absolute() {
        return Ok(cli.project.clone());
    }
    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    Ok(cwd.join(&cli.project).components().collect())
}

fn load_config(cli: &Cli, project: &Path) -> anyhow::Result<Config> {
    Config::load_from(project, cli.config.clone()).with_context(|| {
        format!(
            "failed to load configuration for project {}",
            project.display()
        )
    })
}

fn make_pipeline(config: &Config, project: &Path) -> Pipeline {
    let npm = Npm::new(config.tools.npm_binary.clone(), config.tools_dir());
    let compiler = TraceurCompiler::new(npm, &config.compiler);
    Pipeline::new(config, project, compiler)
}

async fn handle_build(cli: &Cli, project: &Path, force: bool) -> anyhow::Result<()> {
    let config = load_config(cli, project)?;
    let pipeline = make_pipeline(&config, project).with_force(force);

    pipeline
        .prepare()
        .await
        .context("failed to provision the Traceur compiler")?;
    let report = pipeline.build_all().await?;

    println!(
        "Compiled {} of {} script assets ({} up to date)",
        report.compiled, report.scanned, report.skipped
    );
    Ok(())
}

async fn handle_watch(cli: &Cli, project: &Path, skip_initial: bool) -> anyhow::Result<()> {
    let config = load_config(cli, project)?;
    let mut pipeline = make_pipeline(&config, project);

    pipeline
        .prepare()
        .await
        .context("failed to provision the Traceur compiler")?;

    if skip_initial {
        println!("Skipping initial build");
    } else {
        let report = pipeline.build_all().await?;
        println!(
            "Initial build: {} compiled, {} up to date",
            report.compiled, report.skipped
        );
    }

    let roots: Vec<PathBuf> = pipeline
        .layout()
        .roots()
        .iter()
        .map(|root| root.source_dir().to_path_buf())
        .filter(|dir| dir.is_dir())
        .collect();
    if roots.is_empty() {
        anyhow::bail!("no source directories to watch under {}", project.display());
    }
    for root in &roots {
        println!("Watching {}", root.display());
    }
    println!("Press Ctrl-C to stop");

    let mut service = WatchService::new(WatchOptions {
        roots,
        debounce: config.debounce(),
        ignore_patterns: config.assets.exclude.clone(),
    });
    let changes = service.start()?;

    tokio::select! {
        summary = dispatch(changes, &mut pipeline) => {
            println!(
                "Watch stream closed: {} changes handled, {} failed, {} ignored",
                summary.handled, summary.failed, summary.skipped
            );
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            println!();
            println!("Stopping");
        }
    }

    service.stop()?;
    Ok(())
}

fn handle_clean(cli: &Cli, project: &Path, keep_cache: bool) -> anyhow::Result<()> {
    let mut config = load_config(cli, project)?;
    // Cleaning must not create a cache database that was never there.
    if !config.cache_path(project).is_file() {
        config.cache.enabled = false;
    }

    let pipeline = make_pipeline(&config, project);
    let removed = pipeline.clean(keep_cache)?;

    println!("Removed {removed} compiled artifacts");
    Ok(())
}

fn handle_status(cli: &Cli, project: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(cli, project)?;
    let layout = AssetLayout::from_config(project, &config.assets);
    let config_file = Config::config_path_for(project);
    let cache_path = config.cache_path(project);

    let stats = if config.cache.enabled && cache_path.is_file() {
        Some(CompileCache::open(&cache_path)?.stats()?)
    } else {
        None
    };

    if json {
        let roots: Vec<_> = layout
            .roots()
            .iter()
            .map(|root| {
                serde_json::json!({
                    "kind": root.kind().to_string(),
                    "source": root.source_dir(),
                    "output": root.output_dir(),
                    "present": root.source_dir().is_dir(),
                })
            })
            .collect();
        let status = serde_json::json!({
            "project": project,
            "config_file": config_file.is_file().then_some(&config_file),
            "roots": roots,
            "compiler": {
                "package": "traceur",
                "version": &config.compiler.version,
                "module_strategy": &config.compiler.module_strategy,
            },
            "npm_binary": &config.tools.npm_binary,
            "tools_dir": config.tools_dir(),
            "cache": stats.map(|stats| serde_json::json!({
                "path": &cache_path,
                "entries": stats.total_entries,
                "oldest_compile": stats.oldest_compile.map(|t| t.to_rfc3339()),
                "newest_compile": stats.newest_compile.map(|t| t.to_rfc3339()),
                "size_bytes": stats.db_size_bytes,
            })),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("esdown status");
        println!("-------------");
        println!("Project:       {}", project.display());
        if config_file.is_file() {
            println!("Config file:   {}", config_file.display());
        } else {
            println!(
                "Config file:   {} (not found, using defaults)",
                config_file.display()
            );
        }
        println!("Npm binary:    {}", config.tools.npm_binary);
        println!("Tools dir:     {}", config.tools_dir().display());
        match &config.compiler.module_strategy {
            Some(strategy) => println!(
                "Traceur:       {} (modules: {strategy})",
                config.compiler.version
            ),
            None => println!("Traceur:       {}", config.compiler.version),
        }
        println!();
        println!("Asset roots:");
        for root in layout.roots() {
            let marker = if root.source_dir().is_dir() {
                ""
            } else {
                " (missing)"
            };
            let label = format!("{}:", root.kind());
            println!(
                "  {label:<9} {} -> {}{}",
                root.source_dir().display(),
                root.output_dir().display(),
                marker
            );
        }
        println!();
        match stats {
            Some(stats) => {
                println!("Cache:         {}", cache_path.display());
                println!("  Entries:         {}", stats.total_entries);
                if let Some(newest) = stats.newest_compile {
                    println!("  Newest compile:  {}", newest.to_rfc3339());
                }
                if let Some(oldest) = stats.oldest_compile {
                    println!("  Oldest compile:  {}", oldest.to_rfc3339());
                }
                println!("  Size:            {} bytes", stats.db_size_bytes);
            }
            None if config.cache.enabled => {
                println!("Cache:         {} (not created yet)", cache_path.display());
            }
            None => println!("Cache:         disabled"),
        }
    }
    Ok(())
}

fn handle_config(cli: &Cli, project: &Path, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = load_config(cli, project)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Assets]");
                println!(
                    "  Internal dir:     {}",
                    config.assets.internal_dir.display()
                );
                println!(
                    "  External dir:     {}",
                    config.assets.external_dir.display()
                );
                println!(
                    "  Internal output:  {}",
                    config.assets.internal_output.display()
                );
                println!(
                    "  External output:  {}",
                    config.assets.external_output.display()
                );
                println!("  Extensions:       {}", config.assets.extensions.join(", "));
                println!("  Exclude patterns: {}", config.assets.exclude.join(", "));
                println!();
                println!("[Compiler]");
                println!("  Traceur version:  {}", config.compiler.version);
                println!(
                    "  Module strategy:  {}",
                    config
                        .compiler
                        .module_strategy
                        .as_deref()
                        .unwrap_or("(default)")
                );
                println!();
                println!("[Watch]");
                println!("  Debounce (ms):    {}", config.watch.debounce_ms);
                println!();
                println!("[Cache]");
                println!("  Enabled:          {}", config.cache.enabled);
                println!(
                    "  Path:             {}",
                    config.cache_path(project).display()
                );
                println!();
                println!("[Tools]");
                println!("  Npm binary:       {}", config.tools.npm_binary);
                println!("  Directory:        {}", config.tools_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::config_path_for(project).display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .clone()
                .unwrap_or_else(|| Config::config_path_for(project));
            println!("Validating configuration: {}", path.display());
            match Config::load_from(project, Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
