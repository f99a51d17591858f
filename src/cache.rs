//! Summary Cache
//!
//! Persistent `NodeId -> CacheEntry` map with an in-run change tracker.
//!
//! The map is loaded once at run start and saved once at run end. Loading
//! never fails: a missing or corrupt file yields an empty cache. Saving is a
//! staged commit: the full map goes to a temporary file, which is promoted
//! over the primary only if it passes a shrink check; the previous primary is
//! kept as the newest backup.

use crate::error::CacheError;
use crate::types::{CacheEntry, ContentHash, NodeId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

mod persistence;
mod runtime;

pub use persistence::{backup_path, temp_path};
pub use runtime::{RuntimeMark, RuntimeStatus};

/// Cache persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Primary cache file, relative paths resolve against the workspace
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    /// Number of backup generations kept next to the primary
    #[serde(default = "default_backups")]
    pub backups: usize,

    /// Promotion is refused when the new file is smaller than this fraction
    /// of the previous one
    #[serde(default = "default_shrink_ratio")]
    pub shrink_ratio: f64,

    /// Previous files below this size are never guarded
    #[serde(default = "default_shrink_guard_min_bytes")]
    pub shrink_guard_min_bytes: u64,

    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".summit/summary_cache.json")
}

fn default_backups() -> usize {
    2
}

fn default_shrink_ratio() -> f64 {
    0.5
}

fn default_shrink_guard_min_bytes() -> u64 {
    4096
}

fn default_write_attempts() -> u32 {
    3
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            backups: default_backups(),
            shrink_ratio: default_shrink_ratio(),
            shrink_guard_min_bytes: default_shrink_guard_min_bytes(),
            write_attempts: default_write_attempts(),
        }
    }
}

impl CacheConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("Cache path cannot be empty".to_string());
        }
        if self.backups == 0 {
            return Err("At least one backup generation is required".to_string());
        }
        if !(0.0..=1.0).contains(&self.shrink_ratio) {
            return Err(format!(
                "shrink_ratio must be in [0, 1], got {}",
                self.shrink_ratio
            ));
        }
        if self.write_attempts == 0 {
            return Err("write_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// On-disk shape of one entry; the node id is the map key
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    artifact: String,
    content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependency_fingerprint: Option<ContentHash>,
    updated_at: DateTime<Utc>,
}

/// A fully written temporary file waiting for promotion
#[derive(Debug)]
pub struct StagedCache {
    pub temp_path: PathBuf,
    pub bytes: u64,
    pub entries: usize,
}

/// Result of [`SummaryCache::save`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The cache has no backing file
    Skipped,
    Promoted { entries: usize, bytes: u64 },
    /// The new file was discarded; the previous primary is untouched
    Rejected { new_bytes: u64, previous_bytes: u64 },
}

pub struct SummaryCache {
    config: Option<CacheConfig>,
    entries: RwLock<HashMap<NodeId, CacheEntry>>,
    runtime: RuntimeStatus,
    /// The primary was unreadable at load; the next save must not compare
    /// against its size.
    recovered: AtomicBool,
}

impl SummaryCache {
    /// Isolated cache with no backing file
    pub fn in_memory() -> Self {
        Self {
            config: None,
            entries: RwLock::new(HashMap::new()),
            runtime: RuntimeStatus::new(),
            recovered: AtomicBool::new(false),
        }
    }

    /// Load the cache file described by `config`.
    ///
    /// A missing file starts an empty cache. An unreadable or corrupt file is
    /// logged and also starts an empty cache.
    pub fn load(config: CacheConfig) -> Self {
        let (entries, recovered) = match read_entries(&config.path) {
            Ok(Some(entries)) => {
                info!(
                    path = %config.path.display(),
                    entries = entries.len(),
                    "Loaded summary cache"
                );
                (entries, false)
            }
            Ok(None) => {
                info!(path = %config.path.display(), "No summary cache found, starting empty");
                (HashMap::new(), false)
            }
            Err(e) => {
                warn!(
                    path = %config.path.display(),
                    error = %e,
                    "Summary cache unreadable, starting with an empty cache"
                );
                (HashMap::new(), true)
            }
        };

        Self {
            config: Some(config),
            entries: RwLock::new(entries),
            runtime: RuntimeStatus::new(),
            recovered: AtomicBool::new(recovered),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.config.as_ref().map(|c| c.path.as_path())
    }

    pub fn get(&self, id: &NodeId) -> Option<CacheEntry> {
        self.entries.read().get(id).cloned()
    }

    pub fn put(&self, entry: CacheEntry) {
        self.entries.write().insert(entry.node_id.clone(), entry);
    }

    /// Insert a batch under a single lock acquisition.
    pub fn put_many(&self, entries: impl IntoIterator<Item = CacheEntry>) {
        let mut map = self.entries.write();
        for entry in entries {
            map.insert(entry.node_id.clone(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Reset the change tracker at the start of a run.
    pub fn begin_run(&self) {
        self.runtime.clear();
    }

    pub fn runtime(&self) -> &RuntimeStatus {
        &self.runtime
    }

    pub fn set_runtime_changed(&self, id: &NodeId) {
        self.runtime.set_changed(id);
    }

    pub fn set_runtime_failed(&self, id: &NodeId) {
        self.runtime.set_failed(id);
    }

    /// True iff any of `ids` was regenerated earlier in this run.
    pub fn was_any_dependency_changed<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>) -> bool {
        self.runtime.any_changed(ids)
    }

    /// True iff any of `ids` failed earlier in this run.
    pub fn was_any_dependency_failed<'a>(&self, ids: impl IntoIterator<Item = &'a NodeId>) -> bool {
        self.runtime.any_failed(ids)
    }

    /// Serialize the full map into the temporary file. `None` for an
    /// in-memory cache.
    pub fn stage(&self) -> Result<Option<StagedCache>, CacheError> {
        let Some(config) = &self.config else {
            return Ok(None);
        };

        let (bytes, entries) = {
            let map = self.entries.read();
            let persisted: BTreeMap<&NodeId, PersistedEntry> = map
                .iter()
                .map(|(id, entry)| {
                    (
                        id,
                        PersistedEntry {
                            artifact: entry.artifact.clone(),
                            content_hash: entry.content_hash.clone(),
                            dependency_fingerprint: entry.dependency_fingerprint.clone(),
                            updated_at: entry.updated_at,
                        },
                    )
                })
                .collect();
            (serde_json::to_vec(&persisted)?, persisted.len())
        };

        let temp_path = persistence::write_temp(&config.path, &bytes)?;
        debug!(path = %temp_path.display(), bytes = bytes.len(), "Staged summary cache");
        Ok(Some(StagedCache {
            temp_path,
            bytes: bytes.len() as u64,
            entries,
        }))
    }

    /// Promote a staged file: shrink check, backup rotation, atomic rename.
    pub fn commit(&self, staged: StagedCache) -> Result<SaveOutcome, CacheError> {
        self.commit_attempt(staged, &mut false)
    }

    /// One promotion attempt. `rotated` carries over between attempts of the
    /// same save so a retried rename does not shift the backups twice.
    fn commit_attempt(&self, staged: StagedCache, rotated: &mut bool) -> Result<SaveOutcome, CacheError> {
        let Some(config) = &self.config else {
            return Ok(SaveOutcome::Skipped);
        };

        if let Some(previous_bytes) = persistence::file_size(&config.path) {
            let guarded = !self.recovered.load(Ordering::SeqCst)
                && previous_bytes >= config.shrink_guard_min_bytes;
            if guarded && (staged.bytes as f64) < previous_bytes as f64 * config.shrink_ratio {
                error!(
                    path = %config.path.display(),
                    staged = %staged.temp_path.display(),
                    new_bytes = staged.bytes,
                    previous_bytes,
                    "New summary cache is drastically smaller than the previous one, keeping the previous file; staged file left for inspection"
                );
                return Ok(SaveOutcome::Rejected {
                    new_bytes: staged.bytes,
                    previous_bytes,
                });
            }
        }

        if !*rotated {
            persistence::rotate_backups(&config.path, config.backups)?;
            *rotated = true;
        }
        persistence::promote(&staged.temp_path, &config.path)?;
        self.recovered.store(false, Ordering::SeqCst);

        info!(
            path = %config.path.display(),
            entries = staged.entries,
            bytes = staged.bytes,
            "Saved summary cache"
        );
        Ok(SaveOutcome::Promoted {
            entries: staged.entries,
            bytes: staged.bytes,
        })
    }

    /// Stage and commit, retrying I/O failures with a short linear backoff.
    ///
    /// Backups rotate at most once per save. On exhaustion the previously
    /// promoted primary is still in place.
    pub fn save(&self) -> Result<SaveOutcome, CacheError> {
        let Some(config) = &self.config else {
            return Ok(SaveOutcome::Skipped);
        };

        let attempts = config.write_attempts.max(1);
        let mut rotated = false;
        let mut last_error = None;
        for attempt in 1..=attempts {
            let result = self.stage().and_then(|staged| match staged {
                Some(staged) => self.commit_attempt(staged, &mut rotated),
                None => Ok(SaveOutcome::Skipped),
            });
            match result {
                Ok(outcome) => return Ok(outcome),
                Err(CacheError::Io(e)) => {
                    warn!(attempt, error = %e, "Summary cache write failed");
                    last_error = Some(e.to_string());
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_millis(50 * attempt as u64));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(CacheError::PersistenceWriteFailure {
            attempts,
            message: last_error.unwrap_or_default(),
        })
    }
}

fn read_entries(path: &Path) -> Result<Option<HashMap<NodeId, CacheEntry>>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let persisted: HashMap<NodeId, PersistedEntry> =
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))?;

    Ok(Some(
        persisted
            .into_iter()
            .map(|(id, p)| {
                let entry = CacheEntry {
                    node_id: id.clone(),
                    artifact: p.artifact,
                    content_hash: p.content_hash,
                    dependency_fingerprint: p.dependency_fingerprint,
                    updated_at: p.updated_at,
                };
                (id, entry)
            })
            .collect(),
    ))
}
