use crate::models::InitConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use thiserror::Error;

/// Name of the cache file inside the decompiled mods folder
pub const CACHE_FILE_NAME: &str = "cache.json";

const DEOBFUSCATED_MODS_DIR: &str = "deobfuscated_mods";
const DECOMPILED_MODS_DIR: &str = "decompiled_mods";

/// Errors raised while reading the decompilation cache
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to read cache file {path}: {source}")]
    CacheRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache file {path} is not a valid JSON object: {source}")]
    CacheParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fixed directory layout of a workspace
///
/// ```text
/// <root>/tmp/
/// <root>/tmp/decompiler_test/
/// <root>/result/
/// <root>/result/deobfuscated_mods/
/// <root>/result/decompiled_mods/cache.json
/// <root>/resources/test_mod.jar
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: Utf8PathBuf,

    pub tmp_dir: Utf8PathBuf,
    pub decompiler_test_dir: Utf8PathBuf,

    pub result_dir: Utf8PathBuf,
    pub deobfuscated_mods_dir: Utf8PathBuf,
    pub decompiled_mods_dir: Utf8PathBuf,

    /// Known-good mod archive the decompiler check runs against
    pub test_mod_path: Utf8PathBuf,
}

impl WorkspacePaths {
    pub fn new<P: AsRef<Utf8Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();

        let tmp_dir = root.join("tmp");
        let decompiler_test_dir = tmp_dir.join("decompiler_test");

        let result_dir = root.join("result");
        let deobfuscated_mods_dir = result_dir.join(DEOBFUSCATED_MODS_DIR);
        let decompiled_mods_dir = result_dir.join(DECOMPILED_MODS_DIR);

        let test_mod_path = root.join("resources").join("test_mod.jar");

        Self {
            root,
            tmp_dir,
            decompiler_test_dir,
            result_dir,
            deobfuscated_mods_dir,
            decompiled_mods_dir,
            test_mod_path,
        }
    }

    /// Use a different fixture archive for the decompiler check
    pub fn with_test_mod<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.test_mod_path = path.as_ref().to_path_buf();
        self
    }

    pub fn cache_path(&self) -> Utf8PathBuf {
        self.decompiled_mods_dir.join(CACHE_FILE_NAME)
    }
}

/// Decompilation cache: mod folder name -> opaque metadata
///
/// Stored as a single JSON object. The decompilation stage writes it once a mod
/// has finished decompiling; initialisation only reads it to decide which
/// decompiled folders to keep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModCache {
    entries: IndexMap<String, serde_json::Value>,
}

impl ModCache {
    /// Load the cache from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist; that is a normal state
    /// (nothing has finished decompiling yet), not an error.
    pub fn load(path: &Utf8Path) -> Result<Option<Self>, WorkspaceError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(WorkspaceError::CacheRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let entries = serde_json::from_str(&content).map_err(|source| WorkspaceError::CacheParse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Some(Self { entries }))
    }

    #[cfg(test)]
    fn save(&self, path: &Utf8Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries).context("Failed to serialize cache")?;
        fs::write(path, json).with_context(|| format!("Failed to write cache: {}", path))?;
        Ok(())
    }

    pub fn contains(&self, mod_name: &str) -> bool {
        self.entries.contains_key(mod_name)
    }

    #[cfg(test)]
    fn insert(&mut self, mod_name: impl Into<String>, metadata: serde_json::Value) {
        self.entries.insert(mod_name.into(), metadata);
    }

    #[cfg(test)]
    fn mod_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Folder utility over a [`WorkspacePaths`] layout
///
/// All operations are synchronous filesystem calls; errors carry the offending
/// path as context and are meant to propagate.
#[derive(Debug, Clone)]
pub struct Workspace {
    paths: WorkspacePaths,
}

impl Workspace {
    pub fn new(paths: WorkspacePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// Create `path` and any missing parents. Existing folders are left alone.
    pub fn create_folder(&self, path: &Utf8Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Failed to create folder: {}", path))
    }

    /// Recursively remove `path`. A missing folder is not an error.
    pub fn remove_folder(&self, path: &Utf8Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove folder: {}", path)),
        }
    }

    /// Names of the entries directly under `path`, sorted.
    pub fn list_entries(&self, path: &Utf8Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in path
            .read_dir_utf8()
            .with_context(|| format!("Failed to list folder: {}", path))?
        {
            let entry = entry.with_context(|| format!("Failed to read entry in: {}", path))?;
            names.push(entry.file_name().to_string());
        }
        names.sort();
        Ok(names)
    }

    /// Remove and recreate the temp root.
    pub fn clear_temp_folders(&self) -> Result<()> {
        self.remove_folder(&self.paths.tmp_dir)?;
        self.create_folder(&self.paths.tmp_dir)
    }

    /// Remove the whole result tree.
    pub fn clear_result_folders(&self) -> Result<()> {
        self.remove_folder(&self.paths.result_dir)
    }

    /// Folders that must exist after initialisation for `config`.
    ///
    /// A disabled stage's mods folder is deliberately left out.
    pub fn required_folders(&self, config: &InitConfig) -> Vec<&Utf8Path> {
        let mut folders = vec![
            self.paths.tmp_dir.as_path(),
            self.paths.decompiler_test_dir.as_path(),
            self.paths.result_dir.as_path(),
        ];
        if config.deobfuscation_stage_enabled {
            folders.push(self.paths.deobfuscated_mods_dir.as_path());
        }
        if config.decompilation_stage_enabled {
            folders.push(self.paths.decompiled_mods_dir.as_path());
        }
        folders
    }

    /// Create every required folder. Safe to call when they already exist.
    pub fn init_folders(&self, config: &InitConfig) -> Result<()> {
        for folder in self.required_folders(config) {
            self.create_folder(folder)?;
        }
        Ok(())
    }

    /// Reconcile the result tree against the cache, keeping only trusted results.
    ///
    /// Returns the names of decompiled mods that were pruned.
    pub fn reconcile_result_folders(&self, config: &InitConfig) -> Result<Vec<String>> {
        let paths = &self.paths;
        self.create_folder(&paths.result_dir)?;

        if !config.deobfuscation_stage_enabled {
            self.remove_folder(&paths.deobfuscated_mods_dir)?;
        }
        if !config.decompilation_stage_enabled {
            self.remove_folder(&paths.decompiled_mods_dir)?;
        }

        for name in self.list_entries(&paths.result_dir)? {
            if name == DEOBFUSCATED_MODS_DIR || name == DECOMPILED_MODS_DIR {
                continue;
            }
            let path = paths.result_dir.join(&name);
            if path.is_dir() {
                tracing::info!("Clearing {}", name);
                self.remove_folder(&path)?;
            } else {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove file: {}", path))?;
            }
        }

        self.prune_uncached_mods()
    }

    /// Drop decompiled mods that have no cache entry.
    ///
    /// Without a cache file nothing in the decompiled mods folder can be trusted,
    /// so the folder is removed outright.
    pub fn prune_uncached_mods(&self) -> Result<Vec<String>> {
        let decompiled = &self.paths.decompiled_mods_dir;
        if !decompiled.is_dir() {
            return Ok(Vec::new());
        }

        let Some(cache) = ModCache::load(&self.paths.cache_path())? else {
            tracing::info!("No cache found in {}, removing decompiled mods", decompiled);
            self.remove_folder(decompiled)?;
            return Ok(Vec::new());
        };

        let mut pruned = Vec::new();
        for name in self.list_entries(decompiled)? {
            let mod_path = decompiled.join(&name);
            if cache.contains(&name) || !mod_path.is_dir() {
                continue;
            }
            self.remove_folder(&mod_path)?;
            tracing::info!(
                "Found {} in decompiled mods, but it's not in cache. Removing. \
                 Maybe decompilation of it was interrupted.",
                name
            );
            pruned.push(name);
        }

        Ok(pruned)
    }
}
