use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use super::PersistedEntry;
use super::name::CacheName;

/// On-disk layout: one directory per cache (`<root>/<tag>-<role>/`), each
/// entry a body file named by its key digest plus a sibling `.meta` JSON
/// document. Caches hold at most a few hundred entries, so directories are
/// flat rather than sharded.
#[derive(Debug, Clone)]
pub(super) struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub(super) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(super) fn root(&self) -> &Path {
        &self.root
    }

    pub(super) fn cache_dir(&self, name: &CacheName) -> PathBuf {
        self.root.join(name.dir_name())
    }

    pub(super) fn body_path(&self, name: &CacheName, entry_id: &str) -> PathBuf {
        self.cache_dir(name).join(entry_id)
    }

    pub(super) fn meta_path(&self, name: &CacheName, entry_id: &str) -> PathBuf {
        let mut path = self.body_path(name, entry_id);
        path.set_extension("meta");
        path
    }

    pub(super) fn temp_path(&self, name: &CacheName, temp_name: &str) -> PathBuf {
        self.cache_dir(name).join(temp_name)
    }

    pub(super) fn remove_temp_files(&self, dir: &Path) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|file_name| file_name.starts_with("tmp_"))
                    .unwrap_or(false)
            {
                fs::remove_file(&path).ok();
            }
        }
        Ok(())
    }

    pub(super) fn content_hash_matches(&self, path: &Path, expected_hex: &str) -> bool {
        let mut file = match fs::File::open(path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut hasher = Hasher::new();
        let mut buf = [0u8; 8192];
        loop {
            match std::io::Read::read(&mut file, &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buf[..n]);
                }
                Err(_) => return false,
            }
        }
        hasher.finalize().to_hex().to_string() == expected_hex
    }

    pub(super) fn remove_entry_files(&self, name: &CacheName, entry_id: &str) {
        fs::remove_file(self.body_path(name, entry_id)).ok();
        fs::remove_file(self.meta_path(name, entry_id)).ok();
    }

    pub(super) async fn remove_entry_files_async(&self, name: &CacheName, entry_id: &str) {
        let _ = async_fs::remove_file(self.body_path(name, entry_id)).await;
        let _ = async_fs::remove_file(self.meta_path(name, entry_id)).await;
    }

    /// Writes the body to a temp file and renames it into place, so a torn
    /// write never leaves a partial body under the final name.
    pub(super) async fn write_body_async(
        &self,
        name: &CacheName,
        entry_id: &str,
        body: &[u8],
    ) -> Result<()> {
        let dir = self.cache_dir(name);
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;

        let temp_name = format!("tmp_{}", uuid::Uuid::new_v4());
        let temp_path = self.temp_path(name, &temp_name);
        let result = async {
            let mut file = async_fs::File::create(&temp_path)
                .await
                .with_context(|| format!("failed to open cache temp file {}", temp_path.display()))?;
            file.write_all(body).await?;
            file.flush().await?;
            drop(file);
            async_fs::rename(&temp_path, self.body_path(name, entry_id)).await?;
            Ok(())
        }
        .await;
        if result.is_err() {
            let _ = async_fs::remove_file(&temp_path).await;
        }
        result
    }

    /// Same temp-then-rename discipline as the body, so a failed metadata
    /// write never disturbs an existing `.meta` file.
    pub(super) async fn write_metadata_async(
        &self,
        name: &CacheName,
        entry_id: &str,
        entry: &PersistedEntry,
    ) -> Result<()> {
        let dir = self.cache_dir(name);
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create cache dir {}", dir.display()))?;

        let meta_path = self.meta_path(name, entry_id);
        let data = serde_json::to_vec(entry)?;
        let temp_name = format!("tmp_{}", uuid::Uuid::new_v4());
        let temp_path = self.temp_path(name, &temp_name);
        let result = async {
            let mut file = async_fs::File::create(&temp_path)
                .await
                .with_context(|| format!("failed to open cache temp file {}", temp_path.display()))?;
            file.write_all(&data).await?;
            file.flush().await?;
            drop(file);
            async_fs::rename(&temp_path, &meta_path)
                .await
                .with_context(|| format!("failed to write cache metadata {}", meta_path.display()))?;
            Ok(())
        }
        .await;
        if result.is_err() {
            let _ = async_fs::remove_file(&temp_path).await;
        }
        result
    }
}
