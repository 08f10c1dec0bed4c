use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use tokio::fs as async_fs;
use tracing::warn;

use super::name::CacheName;
use super::{CacheEntry, CacheState, EntryKey, FifoIndex, PersistedEntry};

const TOMBSTONE_PREFIX: &str = "tombstone-";

fn tombstone_dir_name(dir_name: &str) -> String {
    format!("{TOMBSTONE_PREFIX}{dir_name}-{}", uuid::Uuid::new_v4())
}

/// Creates the cache root and collects tombstone directories left behind by
/// an interrupted deletion, so the caller can finish removing them.
pub(super) async fn prepare_cache_root(root: &Path) -> Result<Vec<PathBuf>> {
    async_fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create cache root {}", root.display()))?;

    let mut cleanup_dirs = Vec::new();
    let mut entries = match async_fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(cleanup_dirs),
        Err(err) => return Err(err.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(TOMBSTONE_PREFIX)
        {
            cleanup_dirs.push(entry.path());
        }
    }
    Ok(cleanup_dirs)
}

pub(super) fn spawn_tombstone_cleanup(dirs: Vec<PathBuf>) {
    for dir in dirs {
        tokio::spawn(async move {
            match async_fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        path = %dir.display(),
                        "failed to remove tombstoned cache dir"
                    );
                }
            }
        });
    }
}

impl CacheState {
    /// Renames a cache directory out of the live namespace and schedules its
    /// removal. A crash between the rename and the removal leaves only a
    /// tombstone, which the next store construction cleans up.
    pub(super) async fn tombstone_cache_dir(&self, dir: &Path) -> Result<()> {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tombstone_path = self.disk.root().join(tombstone_dir_name(&dir_name));
        match async_fs::rename(dir, &tombstone_path).await {
            Ok(()) => {
                spawn_tombstone_cleanup(vec![tombstone_path]);
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to tombstone {}", dir.display())),
        }
    }

    /// Restores in-memory indexes for every current-tag cache directory.
    /// Stale-tag directories are left untouched; deleting them is the
    /// activation step's job. Runs on the blocking pool with sync IO.
    pub(super) fn rebuild_from_disk(&self) -> Result<()> {
        let root = self.disk.root().to_path_buf();
        if !root.exists() {
            return Ok(());
        }

        for dir_entry in fs::read_dir(&root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = dir_entry.file_name().to_string_lossy().into_owned();
            let Some(name) = CacheName::parse(&dir_name) else {
                continue;
            };
            if !name.matches_tag(&self.tag) {
                continue;
            }
            self.rebuild_cache_dir(&name, &dir_entry.path())?;
        }
        Ok(())
    }

    fn rebuild_cache_dir(&self, name: &CacheName, dir: &Path) -> Result<()> {
        self.disk.remove_temp_files(dir)?;

        let mut meta_files = Vec::new();
        let mut other_files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() {
                if path.extension().and_then(|ext| ext.to_str()) == Some("meta") {
                    meta_files.push(path);
                } else {
                    other_files.push(path);
                }
            }
        }

        let mut restored: Vec<(String, PersistedEntry)> = Vec::new();
        let mut live_ids = HashSet::new();
        for meta in meta_files {
            if let Some((key_base, persisted)) = self.restore_entry_from_meta(name, &meta) {
                live_ids.insert(EntryKey::entry_id_for_key(&key_base));
                restored.push((key_base, persisted));
            }
        }

        // Body files with no surviving metadata are orphans.
        for path in other_files {
            let keep = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| live_ids.contains(n))
                .unwrap_or(false);
            if !keep {
                fs::remove_file(&path).ok();
            }
        }

        // Replay insertions oldest-first so FIFO order survives a restart.
        restored.sort_by(|a, b| {
            (a.1.inserted_at_ms, a.1.seq).cmp(&(b.1.inserted_at_ms, b.1.seq))
        });

        let mut index = FifoIndex::new();
        for (key_base, persisted) in restored {
            let entry_id = EntryKey::entry_id_for_key(&key_base);
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let entry = CacheEntry::from_persisted(&persisted, &entry_id, seq);
            index.insert(key_base, entry);
        }
        self.indexes.lock().insert(name.clone(), index);
        Ok(())
    }

    fn restore_entry_from_meta(
        &self,
        name: &CacheName,
        meta_path: &Path,
    ) -> Option<(String, PersistedEntry)> {
        let data = match fs::read(meta_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "failed to read cache metadata {}: {}",
                    meta_path.display(),
                    err
                );
                return None;
            }
        };

        let persisted: PersistedEntry = match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "failed to parse cache metadata {}: {}",
                    meta_path.display(),
                    err
                );
                self.remove_files_for_meta(name, meta_path);
                return None;
            }
        };

        let entry_id = EntryKey::entry_id_for_key(&persisted.key_base);
        let file_stem = meta_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if entry_id != file_stem {
            warn!(
                expected = entry_id,
                actual = file_stem,
                "cache metadata key mismatch; removing entry"
            );
            self.remove_files_for_meta(name, meta_path);
            return None;
        }

        if !valid_content_hash(&persisted.content_hash) {
            warn!(
                "cache metadata {} has invalid content hash; removing entry",
                meta_path.display()
            );
            fs::remove_file(meta_path).ok();
            return None;
        }

        let body_path = self.disk.body_path(name, &entry_id);
        if !body_path.exists() {
            self.remove_files_for_meta(name, meta_path);
            return None;
        }

        if !self
            .disk
            .content_hash_matches(&body_path, &persisted.content_hash)
        {
            warn!(
                "cache content hash mismatch for {}; removing entry",
                body_path.display()
            );
            self.remove_files_for_meta(name, meta_path);
            return None;
        }

        Some((persisted.key_base.clone(), persisted))
    }

    fn remove_files_for_meta(&self, name: &CacheName, meta_path: &Path) {
        if let Some(stem) = meta_path.file_stem().and_then(|s| s.to_str()) {
            self.disk.remove_entry_files(name, stem);
        } else {
            fs::remove_file(meta_path).ok();
        }
    }
}

fn valid_content_hash(value: &str) -> bool {
    value.len() == 64 && value.as_bytes().iter().all(|b| b.is_ascii_hexdigit())
}
