//! File content providers
//!
//! `WorkspaceFiles` serves files from a directory on demand and caches
//! their content until the file's mtime changes. Paths the caller knows
//! about (from a tree listing, say) are only read the first time they
//! are asked for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::FileContentProvider;
use crate::constants::files::{MAX_CACHE_ENTRIES, MAX_RELEVANT_FILES};

/// Cached file content with modification time for invalidation
#[derive(Clone, Debug)]
struct CachedFile {
    content: String,
    mtime: Option<SystemTime>,
}

/// Filesystem-backed provider rooted at a workspace directory
pub struct WorkspaceFiles {
    root: PathBuf,
    /// Canonical root, used to reject paths that escape the workspace
    canonical_root: Option<PathBuf>,
    files: DashMap<PathBuf, CachedFile>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl WorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let canonical_root = root.canonicalize().ok();
        Self {
            root,
            canonical_root,
            files: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` inside the workspace, or `None` if it escapes it
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let canonical = joined.canonicalize().ok()?;
        match &self.canonical_root {
            Some(root) if !canonical.starts_with(root) => {
                debug!(path, "Rejected path outside workspace");
                None
            }
            _ => Some(canonical),
        }
    }

    async fn cached(&self, path: &Path) -> Option<String> {
        let cached = self.files.get(path)?.clone();
        if let Some(cached_mtime) = cached.mtime {
            let current = tokio::fs::metadata(path)
                .await
                .ok()
                .and_then(|m| m.modified().ok());
            if current != Some(cached_mtime) {
                debug!(path = %path.display(), "Cache STALE (mtime changed)");
                self.files.remove(path);
                return None;
            }
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "Cache HIT");
        Some(cached.content)
    }

    fn store(&self, path: PathBuf, content: String, mtime: Option<SystemTime>) {
        if self.files.len() >= MAX_CACHE_ENTRIES {
            // Release the iterator's shard guard before removing
            let oldest = self.files.iter().next().map(|e| e.key().clone());
            if let Some(key) = oldest {
                self.files.remove(&key);
                debug!(path = %key.display(), "Cache EVICT (size limit)");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), size = content.len(), "Cache PUT");
        self.files.insert(path, CachedFile { content, mtime });
    }

    fn display_path(&self, path: &Path) -> String {
        let base = self.canonical_root.as_deref().unwrap_or(&self.root);
        path.strip_prefix(base)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.files.len(),
        }
    }
}

#[async_trait]
impl FileContentProvider for WorkspaceFiles {
    async fn active_file_content(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path)?;
        if let Some(content) = self.cached(&resolved).await {
            return Some(content);
        }

        let content = match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %resolved.display(), "Failed to read file: {}", e);
                return None;
            }
        };
        let mtime = tokio::fs::metadata(&resolved)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        self.store(resolved, content.clone(), mtime);
        Some(content)
    }

    async fn relevant_files(&self, path: &str) -> Vec<String> {
        let Some(resolved) = self.resolve(path) else {
            return Vec::new();
        };
        let Some(parent) = resolved.parent() else {
            return Vec::new();
        };
        let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
            return Vec::new();
        };

        let mut siblings = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let entry_path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && entry_path != resolved {
                siblings.push(self.display_path(&entry_path));
            }
        }
        siblings.sort();
        siblings.truncate(MAX_RELEVANT_FILES);
        siblings
    }
}

/// Cache statistics for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "File cache: {} hits / {} misses ({} entries)",
            self.hits, self.misses, self.entries
        )
    }
}

/// In-memory provider keyed by path
#[derive(Debug, Clone, Default)]
pub struct StaticFiles {
    files: HashMap<String, String>,
}

impl StaticFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

#[async_trait]
impl FileContentProvider for StaticFiles {
    async fn active_file_content(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    async fn relevant_files(&self, path: &str) -> Vec<String> {
        let parent = Path::new(path).parent();
        let mut siblings: Vec<String> = self
            .files
            .keys()
            .filter(|other| other.as_str() != path && Path::new(other.as_str()).parent() == parent)
            .cloned()
            .collect();
        siblings.sort();
        siblings.truncate(MAX_RELEVANT_FILES);
        siblings
    }
}
