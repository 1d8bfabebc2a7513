//! Recording storage

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use url::Url;

use super::MediaStore;

/// Reject absolute paths and `..` so uploads stay under the media root.
fn check_relative(path: &str) -> Result<&Path> {
    let p = Path::new(path);
    if path.is_empty() || !p.components().all(|c| matches!(c, Component::Normal(_))) {
        bail!("Invalid media path: {}", path);
    }
    Ok(p)
}

/// Stores recordings as files and hands out `file://` URLs.
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<String> {
        let rel = check_relative(path)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let root = tokio::fs::canonicalize(&self.root).await?;

        let target = root.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &data)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        tracing::debug!("Stored {} bytes at {}", data.len(), target.display());
        let url = Url::from_file_path(&target)
            .map_err(|_| anyhow!("Cannot build URL for {}", target.display()))?;
        Ok(url.to_string())
    }
}

/// Keeps recordings in memory; used for single-process sessions.
#[derive(Default)]
pub struct MemoryMediaStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().ok()?.get(path).cloned()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<String> {
        check_relative(path)?;
        self.blobs
            .lock()
            .map_err(|_| anyhow!("Media store lock poisoned"))?
            .insert(path.to_string(), data);
        Ok(format!("memory:///{}", path))
    }
}
