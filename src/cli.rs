//! `cache-tools` command surface
//!
//! Each flag maps to one cache manager operation; `--stats` is the default.

use std::env;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};

use crate::cache::{CacheManager, TracingObserver};
use crate::config::CacheConfig;

const DEFAULT_DIR_NAME: &str = "scaffold-cache";

/// Inspect and maintain the scaffolding tool cache.
#[derive(Debug, Parser)]
#[command(name = "cache-tools", author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .args(["stats", "clear", "save", "info", "validate", "refresh", "export", "import"])
        .multiple(false)
))]
pub struct CacheToolsArgs {
    /// Cache directory
    #[arg(long, value_name = "DIR", env = "CACHE_TOOLS_DIR")]
    pub dir: Option<PathBuf>,

    /// Show cache statistics (default)
    #[arg(long)]
    pub stats: bool,

    /// Remove every cached entry and the cache file
    #[arg(long)]
    pub clear: bool,

    /// Write the cache file now
    #[arg(long)]
    pub save: bool,

    /// Show cache location and configuration
    #[arg(long)]
    pub info: bool,

    /// Check entries and storage for problems
    #[arg(long)]
    pub validate: bool,

    /// Sweep expired entries and repair the rest
    #[arg(long)]
    pub refresh: bool,

    /// Write a backup of the cache to FILE
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Replace the cache with the backup in FILE
    #[arg(long, value_name = "FILE")]
    pub import: Option<PathBuf>,

    /// Print stats and info as JSON
    #[arg(long)]
    pub json: bool,
}

// == Action ==
/// The single operation selected by the flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Stats,
    Clear,
    Save,
    Info,
    Validate,
    Refresh,
    Export(PathBuf),
    Import(PathBuf),
}

impl CacheToolsArgs {
    pub fn action(&self) -> Action {
        if self.clear {
            Action::Clear
        } else if self.save {
            Action::Save
        } else if self.info {
            Action::Info
        } else if self.validate {
            Action::Validate
        } else if self.refresh {
            Action::Refresh
        } else if let Some(path) = &self.export {
            Action::Export(path.clone())
        } else if let Some(path) = &self.import {
            Action::Import(path.clone())
        } else {
            Action::Stats
        }
    }

    /// Directory from `--dir`, else the per-user cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_cache_dir)
    }
}

/// `$XDG_CACHE_HOME/scaffold-cache`, falling back to `~/.cache/scaffold-cache`.
pub fn default_cache_dir() -> PathBuf {
    let base = env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(env::temp_dir);
    base.join(DEFAULT_DIR_NAME)
}

// == Run ==
/// Opens the cache and runs the selected action, returning the text to print.
pub fn run(args: &CacheToolsArgs, config: CacheConfig) -> Result<String> {
    let dir = args.cache_dir();
    let manager = CacheManager::with_observer(&dir, config, Arc::new(TracingObserver))
        .with_context(|| format!("failed to open cache at {}", dir.display()))?;
    execute(&manager, &args.action(), args.json)
}

/// Runs one action against an open manager.
pub fn execute(manager: &CacheManager, action: &Action, json: bool) -> Result<String> {
    let mut out = String::new();

    match action {
        Action::Stats => {
            let stats = manager.get_stats();
            if json {
                out = serde_json::to_string_pretty(&stats)?;
            } else {
                let m = &stats.metrics;
                writeln!(out, "Cache statistics")?;
                writeln!(out, "  entries:    {}", m.current_entries)?;
                writeln!(out, "  size:       {} bytes", m.current_size)?;
                writeln!(out, "  hits:       {}", m.hits)?;
                writeln!(out, "  misses:     {}", m.misses)?;
                writeln!(out, "  hit rate:   {:.1}%", stats.hit_rate * 100.0)?;
                writeln!(out, "  sets:       {}", m.sets)?;
                writeln!(out, "  deletes:    {}", m.deletes)?;
                writeln!(out, "  evictions:  {}", m.evictions)?;
                write!(out, "  cache file: {}", stats.cache_file.display())?;
            }
        }
        Action::Clear => {
            manager.clear().context("failed to clear cache")?;
            out.push_str("Cache cleared");
        }
        Action::Save => {
            manager.save().context("failed to save cache")?;
            write!(out, "Cache saved to {}", manager.get_stats().cache_file.display())?;
        }
        Action::Info => {
            let config = manager.config();
            if json {
                let info = serde_json::json!({
                    "location": manager.get_location(),
                    "offline_mode": manager.is_offline_mode(),
                    "keys": manager.keys(),
                    "config": config,
                });
                out = serde_json::to_string_pretty(&info)?;
            } else {
                writeln!(out, "Location:        {}", manager.get_location().display())?;
                writeln!(out, "Entries:         {}", manager.keys().len())?;
                writeln!(out, "Max size:        {} bytes", config.max_size)?;
                writeln!(out, "Max entries:     {}", config.max_entries)?;
                writeln!(out, "Eviction policy: {}", config.eviction_policy)?;
                writeln!(out, "Default TTL:     {}s", config.default_ttl.as_secs())?;
                writeln!(out, "Compression:     {}", config.enable_compression)?;
                write!(out, "Persist to disk: {}", config.persist_to_disk)?;
            }
        }
        Action::Validate => {
            manager.validate_cache()?;
            out.push_str("Cache is valid");
        }
        Action::Refresh => {
            let removed = manager.clean()?;
            let dropped = manager.repair_cache()?;
            write!(
                out,
                "Removed {} expired entries, dropped {} invalid entries",
                removed.len(),
                dropped
            )?;
        }
        Action::Export(path) => {
            let written = manager
                .export(path)
                .with_context(|| format!("failed to export cache to {}", path.display()))?;
            write!(out, "Cache exported to {}", written.display())?;
        }
        Action::Import(path) => {
            let count = manager
                .import(path)
                .with_context(|| format!("failed to import cache from {}", path.display()))?;
            write!(out, "Imported {} entries from {}", count, path.display())?;
        }
    }

    Ok(out)
}
