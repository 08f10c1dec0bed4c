use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use tokio::{fs as async_fs, task};
use tracing::{trace, warn};

mod entry;
mod index;
mod key;
mod maintenance;
mod name;
mod store;

use entry::{CacheEntry, PersistedEntry};
use index::FifoIndex;
pub use key::EntryKey;
use maintenance::{prepare_cache_root, spawn_tombstone_cleanup};
pub use name::{CacheName, CacheRole, VersionTag};
use store::DiskStore;

use crate::request::FetchResponse;

/// Named, versioned content caches with FIFO-by-insertion eviction.
///
/// Entries persist on disk under the store root and are rebuilt into
/// in-memory indexes at construction. The store is owned state, cloned
/// cheaply and shared between the strategy router and the host.
#[derive(Clone)]
pub struct CacheStore {
    state: Arc<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    indexes: Mutex<HashMap<CacheName, FifoIndex>>,
    disk: DiskStore,
    tag: VersionTag,
    next_seq: AtomicU64,
}

impl CacheStore {
    /// Opens the store rooted at `root` for the given deployment tag.
    /// Leftover tombstones are cleaned up and current-tag caches are rebuilt
    /// from disk; stale-tag caches stay on disk until activation deletes them.
    pub async fn open(root: PathBuf, tag: VersionTag) -> Result<Self> {
        let cleanup_dirs = prepare_cache_root(&root).await?;
        let state = Arc::new(CacheState {
            indexes: Mutex::new(HashMap::new()),
            disk: DiskStore::new(root),
            tag,
            next_seq: AtomicU64::new(1),
        });
        spawn_tombstone_cleanup(cleanup_dirs);

        let rebuild = {
            let state = state.clone();
            task::spawn_blocking(move || state.rebuild_from_disk())
        };
        rebuild
            .await
            .map_err(|err| anyhow!("cache rebuild task failed: {err}"))??;

        Ok(Self { state })
    }

    pub fn version_tag(&self) -> &VersionTag {
        &self.state.tag
    }

    /// Idempotently creates the named cache (directory plus empty index).
    pub async fn open_cache(&self, name: &CacheName) -> Result<()> {
        let dir = self.state.disk.cache_dir(name);
        async_fs::create_dir_all(&dir).await?;
        let mut indexes = self.state.indexes.lock();
        indexes.entry(name.clone()).or_default();
        Ok(())
    }

    /// Exact-key lookup. A missing or unreadable body drops the entry rather
    /// than serving a torn response.
    pub async fn lookup(&self, name: &CacheName, key: &EntryKey) -> Option<FetchResponse> {
        let entry = {
            let indexes = self.state.indexes.lock();
            indexes.get(name)?.get(key.key_base()).cloned()
        };
        let entry = entry?;

        let body_path = self.state.disk.body_path(name, &entry.entry_id);
        match async_fs::read(&body_path).await {
            Ok(body) => Some(FetchResponse {
                status: entry.status,
                headers: entry.headers.clone(),
                body,
            }),
            Err(err) => {
                warn!(
                    error = %err,
                    path = %body_path.display(),
                    "cache body missing on disk"
                );
                self.state.remove_entry(name, key.key_base());
                self.state
                    .disk
                    .remove_entry_files_async(name, &entry.entry_id)
                    .await;
                None
            }
        }
    }

    /// Inserts or overwrites an entry. Only 200 responses are stored; the
    /// return value says whether anything was written. When `max_items` is
    /// set, the eviction check runs after the insert.
    ///
    /// Metadata lands before the body, and both go through temp-then-rename,
    /// so a failed write leaves a previously cached entry servable: nothing
    /// under the entry's final paths is touched until the metadata is safely
    /// in place, and the body rename is the last filesystem step.
    pub async fn put(
        &self,
        name: &CacheName,
        key: &EntryKey,
        response: &FetchResponse,
        max_items: Option<usize>,
    ) -> Result<bool> {
        if response.status != http::StatusCode::OK {
            trace!(
                status = response.status.as_u16(),
                key = key.key_base(),
                "skipping cache store for non-success response"
            );
            return Ok(false);
        }

        let content_hash = blake3::hash(&response.body).to_hex().to_string();
        let entry = CacheEntry {
            seq: self.state.next_seq.fetch_add(1, Ordering::Relaxed),
            entry_id: key.entry_id().to_string(),
            status: response.status,
            headers: response.headers.clone(),
            inserted_at_ms: now_millis(),
            content_hash,
            content_length: response.body.len() as u64,
        };
        let persisted = entry.to_persisted(key.key_base());

        self.state
            .disk
            .write_metadata_async(name, key.entry_id(), &persisted)
            .await?;

        if let Err(err) = self
            .state
            .disk
            .write_body_async(name, key.entry_id(), &response.body)
            .await
        {
            // Without a prior record the fresh metadata is an orphan; with
            // one, the old body is still on disk and must not be deleted.
            // The metadata/body mismatch left behind is reconciled by the
            // next rebuild.
            if !self.state.has_entry(name, key.key_base()) {
                self.state
                    .disk
                    .remove_entry_files_async(name, key.entry_id())
                    .await;
            }
            return Err(err);
        }

        {
            let mut indexes = self.state.indexes.lock();
            let cache_index = indexes.entry(name.clone()).or_default();
            // Overwrite reuses the same file paths, so the replaced record
            // needs no file cleanup.
            cache_index.insert(key.key_base().to_string(), entry);
        }
        trace!(cache = %name, key = key.key_base(), "stored cache entry");

        if let Some(max_items) = max_items {
            self.evict_to_limit(name, max_items).await;
        }
        Ok(true)
    }

    /// Deletes the oldest-inserted entries until at most `max_items` remain.
    pub async fn evict_to_limit(&self, name: &CacheName, max_items: usize) {
        let evicted = {
            let mut indexes = self.state.indexes.lock();
            match indexes.get_mut(name) {
                Some(cache_index) => cache_index.evict_to(max_items),
                None => return,
            }
        };
        for entry in evicted {
            trace!(cache = %name, entry_id = entry.entry_id, "evicting cache entry");
            self.state
                .disk
                .remove_entry_files_async(name, &entry.entry_id)
                .await;
        }
    }

    pub fn len(&self, name: &CacheName) -> usize {
        self.state
            .indexes
            .lock()
            .get(name)
            .map(FifoIndex::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, name: &CacheName) -> bool {
        self.len(name) == 0
    }

    /// Deletes one cache entirely, index and files.
    pub async fn delete_cache(&self, name: &CacheName) -> Result<()> {
        self.state.indexes.lock().remove(name);
        let dir = self.state.disk.cache_dir(name);
        self.state.tombstone_cache_dir(&dir).await
    }

    /// Removes every cache whose version tag differs from `tag`. Returns the
    /// number of caches deleted. Runs once at activation.
    pub async fn delete_caches_not_matching(&self, tag: &VersionTag) -> Result<usize> {
        let mut removed = 0;
        for (name, dir) in self.scan_cache_dirs().await? {
            if name.matches_tag(tag) {
                continue;
            }
            trace!(cache = %name, "removing stale cache");
            self.state.indexes.lock().remove(&name);
            self.state.tombstone_cache_dir(&dir).await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Deletes every cache immediately, current version included. Explicit
    /// user action outside the version-rollover path.
    pub async fn clear_all(&self) -> Result<()> {
        self.state.indexes.lock().clear();
        for (name, dir) in self.scan_cache_dirs().await? {
            trace!(cache = %name, "clearing cache");
            self.state.tombstone_cache_dir(&dir).await?;
        }
        Ok(())
    }

    /// Lists caches present on disk with their live entry counts. Stale-tag
    /// caches show a count of zero since only current-tag indexes are loaded.
    pub async fn list_caches(&self) -> Result<Vec<(CacheName, usize)>> {
        let mut listed = Vec::new();
        for (name, _dir) in self.scan_cache_dirs().await? {
            let count = self.len(&name);
            listed.push((name, count));
        }
        listed.sort_by(|a, b| a.0.dir_name().cmp(&b.0.dir_name()));
        Ok(listed)
    }

    async fn scan_cache_dirs(&self) -> Result<Vec<(CacheName, PathBuf)>> {
        let mut found = Vec::new();
        let mut entries = match async_fs::read_dir(self.state.disk.root()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(err) => return Err(err.into()),
        };
        while let Some(dir_entry) = entries.next_entry().await? {
            if !dir_entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = dir_entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = CacheName::parse(&dir_name) {
                found.push((name, dir_entry.path()));
            }
        }
        Ok(found)
    }
}

impl CacheState {
    fn has_entry(&self, name: &CacheName, key_base: &str) -> bool {
        self.indexes
            .lock()
            .get(name)
            .is_some_and(|cache_index| cache_index.get(key_base).is_some())
    }

    fn remove_entry(&self, name: &CacheName, key_base: &str) {
        let mut indexes = self.indexes.lock();
        if let Some(cache_index) = indexes.get_mut(name) {
            cache_index.remove(key_base);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
