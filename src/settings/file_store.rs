//! File-backed setting store
//!
//! One file per key under the settings directory. Reads are served from an
//! in-memory cache; writes update the cache immediately and are flushed to
//! disk either inline or on a background flush worker. Flushes for the same
//! key go through [`KeyedLock`] and always write the latest cached value, so
//! the file converges to the last write.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use super::{KeyedLock, SettingStore};

const EXTENSION: &str = "json";

struct FlushWorker {
    handle: tokio::runtime::Handle,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

pub struct JsonFileSettingStore {
    dir: PathBuf,
    cache: Arc<Mutex<HashMap<String, String>>>,
    dirty: Arc<Mutex<HashSet<String>>>,
    locks: KeyedLock,
    worker: Option<FlushWorker>,
}

impl std::fmt::Debug for JsonFileSettingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileSettingStore")
            .field("dir", &self.dir)
            .field("background_flush", &self.worker.is_some())
            .finish()
    }
}

impl JsonFileSettingStore {
    pub fn default_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::SETTINGS_DIR);
        path
    }

    /// Open with inline (blocking) flushes
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create settings directory {}", dir.display()))?;
        let cache = load_all(&dir)?;
        info!(path = %dir.display(), keys = cache.len(), "Opened setting store");
        Ok(Self {
            dir,
            cache: Arc::new(Mutex::new(cache)),
            dirty: Arc::new(Mutex::new(HashSet::new())),
            locks: KeyedLock::new(),
            worker: None,
        })
    }

    /// Open with flushes serialized per key on a background worker thread
    pub fn open_with_background_flush(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::open(dir)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build settings flush runtime")?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("settings-flush".to_string())
            .spawn(move || {
                // Spawned flush tasks make progress while this blocks
                let _ = runtime.block_on(shutdown_rx);
            })
            .context("Failed to spawn settings flush thread")?;
        store.worker = Some(FlushWorker {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        });
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn schedule_flush(&self, key: &str) {
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.insert(key.to_string());
        }
        let Some(worker) = &self.worker else {
            flush_key(&self.dir, &self.cache, &self.dirty, key);
            return;
        };

        let dir = self.dir.clone();
        let cache = self.cache.clone();
        let dirty = self.dirty.clone();
        let locks = self.locks.clone();
        let key = key.to_string();
        worker.handle.spawn(async move {
            let lock_key = key.clone();
            locks
                .unlocking(&lock_key, move || async move {
                    flush_key(&dir, &cache, &dirty, &key);
                })
                .await;
        });
    }

    /// Write every key that has not reached disk yet
    pub fn flush_pending(&self) {
        let pending: Vec<String> = self
            .dirty
            .lock()
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default();
        for key in pending {
            // Same lock as the background writes so a queued flush cannot land after this one
            self.locks
                .blocking_unlocking(&key, || flush_key(&self.dir, &self.cache, &self.dirty, &key));
        }
    }
}

impl Drop for JsonFileSettingStore {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            if let Some(shutdown) = worker.shutdown.take() {
                let _ = shutdown.send(());
            }
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
        self.flush_pending();
    }
}

impl SettingStore for JsonFileSettingStore {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.cache.lock().ok()?.get(&sanitize_key(key)).cloned()
    }

    fn set_setting(&self, key: &str, value: Option<&str>) {
        let key = sanitize_key(key);
        match self.cache.lock() {
            Ok(mut cache) => match value {
                Some(value) => {
                    cache.insert(key.clone(), value.to_string());
                }
                None => {
                    cache.remove(&key);
                }
            },
            Err(_) => {
                warn!(key = %key, "Setting cache poisoned, dropping write");
                return;
            }
        }
        self.schedule_flush(&key);
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn key_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.{EXTENSION}"))
}

fn load_all(dir: &Path) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read settings directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match fs::read_to_string(&path) {
            Ok(contents) => {
                values.insert(key.to_string(), contents);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable setting file");
            }
        }
    }
    Ok(values)
}

fn flush_key(
    dir: &Path,
    cache: &Mutex<HashMap<String, String>>,
    dirty: &Mutex<HashSet<String>>,
    key: &str,
) {
    let value = cache.lock().ok().and_then(|c| c.get(key).cloned());
    if let Err(e) = write_value(dir, key, value.as_deref()) {
        error!(key = %key, error = ?e, "Failed to persist setting");
        return;
    }
    if let Ok(mut dirty) = dirty.lock() {
        dirty.remove(key);
    }
}

fn write_value(dir: &Path, key: &str, value: Option<&str>) -> Result<()> {
    let path = key_path(dir, key);
    match value {
        Some(value) => {
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, value)
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
            fs::rename(&tmp, &path)
                .with_context(|| format!("Failed to move {} into place", path.display()))?;
            debug!(key = %key, bytes = value.len(), "Flushed setting");
        }
        None => {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            debug!(key = %key, "Removed setting");
        }
    }
    Ok(())
}
