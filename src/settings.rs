//! Platform settings: a key/value cache mirrored into page metadata.
//!
//! The cache is the single source of truth for a process. It always refetches
//! on mount, and afterwards only when a change notification has marked it
//! stale.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
};

pub const DEFAULT_TITLE: &str = "Finance Tracker";
pub const DEFAULT_FAVICON: &str = "/favicon.ico";

pub trait SettingsSource {
    fn fetch(&self) -> Result<BTreeMap<String, String>>;
}

/// A TOML file; nested tables flatten into dotted keys.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for FileSettings {
    fn fetch(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!("no settings file at {}", self.path.display());
            return Ok(BTreeMap::new());
        }
        let txt = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        parse_settings(&txt).with_context(|| format!("failed to parse {}", self.path.display()))
    }
}

pub fn parse_settings(txt: &str) -> Result<BTreeMap<String, String>> {
    let table: toml::Table = toml::from_str(txt)?;
    let mut out = BTreeMap::new();
    flatten_table("", &table, &mut out)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::Table,
    out: &mut BTreeMap<String, String>,
) -> Result<()> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Integer(i) => {
                out.insert(key, i.to_string());
            }
            toml::Value::Float(f) => {
                out.insert(key, f.to_string());
            }
            toml::Value::Boolean(b) => {
                out.insert(key, b.to_string());
            }
            toml::Value::Table(sub) => flatten_table(&key, sub, out)?,
            other => {
                return Err(anyhow!(
                    "setting '{key}' must be a scalar, got {}",
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub title: String,
    pub description: Option<String>,
    pub favicon: String,
}

#[derive(Debug)]
pub struct SettingsCache<S> {
    source: S,
    entries: BTreeMap<String, String>,
    stale: bool,
    generation: u64,
}

impl<S: SettingsSource> SettingsCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: BTreeMap::new(),
            stale: true,
            generation: 0,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Unconditional fetch.
    pub fn mount(&mut self) -> Result<()> {
        let entries = self.source.fetch()?;
        self.entries = entries;
        self.stale = false;
        self.generation += 1;
        debug!(
            "settings loaded: {} entries (generation {})",
            self.entries.len(),
            self.generation
        );
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Refetches only if stale. On a failed fetch the previous entries stay
    /// in place and the cache remains stale.
    pub fn ensure_fresh(&mut self) -> Result<bool> {
        if !self.stale {
            return Ok(false);
        }
        self.mount()?;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn public_entries(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("public.").map(|k| (k, v.as_str())))
            .collect()
    }

    pub fn page_meta(&self) -> PageMeta {
        let non_empty = |k: &str| self.get(k).map(str::trim).filter(|v| !v.is_empty());
        PageMeta {
            title: non_empty("site.title").unwrap_or(DEFAULT_TITLE).to_string(),
            description: non_empty("site.description").map(str::to_string),
            favicon: non_empty("site.favicon").unwrap_or(DEFAULT_FAVICON).to_string(),
        }
    }
}

/// Delivers a notification whenever `path` changes. Keep the watcher alive
/// for as long as notifications are wanted.
pub fn watch_file(path: &Path) -> Result<(RecommendedWatcher, Receiver<()>)> {
    let (tx, rx) = mpsc::channel();
    let target = path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if ev.paths.iter().any(|p| p == &target) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!("file watch error: {e}"),
        }
    })?;
    // watch the directory so editors that replace the file are still seen
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("watching {} for changes", path.display());
    Ok((watcher, rx))
}
