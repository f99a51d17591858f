//! JSON-file artifact store.
//!
//! Every write replaces the whole file through a temporary file and rename,
//! so a batch is either fully visible on disk or not at all.

use super::ArtifactSink;
use crate::error::SinkError;
use crate::types::{ArtifactRecord, ContentHash, EmbeddingRecord, NodeId, StoredArtifact};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    artifacts: BTreeMap<NodeId, StoredArtifact>,
    #[serde(default)]
    embeddings: BTreeMap<NodeId, EmbeddingRecord>,
}

pub struct ArtifactStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl ArtifactStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.state.read().artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().artifacts.is_empty()
    }

    pub fn artifact(&self, id: &NodeId) -> Option<StoredArtifact> {
        self.state.read().artifacts.get(id).cloned()
    }

    pub fn embedding(&self, id: &NodeId) -> Option<EmbeddingRecord> {
        self.state.read().embeddings.get(id).cloned()
    }

    pub fn embedding_count(&self) -> usize {
        self.state.read().embeddings.len()
    }

    /// Apply `change` to a copy of the state, persist the copy, then swap it in.
    fn update(&self, change: impl FnOnce(&mut StoreState)) -> Result<(), SinkError> {
        let mut state = self.state.write();
        let mut next = state.clone();
        change(&mut next);
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *state = next;
        Ok(())
    }
}

fn persist(path: &Path, state: &StoreState) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(state)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &bytes)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        SinkError::Io(e)
    })
}

impl ArtifactSink for ArtifactStore {
    fn write_artifacts(&self, batch: &[ArtifactRecord]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.update(|state| {
            for record in batch {
                state.artifacts.insert(
                    record.id.clone(),
                    StoredArtifact {
                        artifact: record.artifact.clone(),
                        content_hash: record.content_hash.clone(),
                        dependency_fingerprint: record.dependency_fingerprint.clone(),
                    },
                );
            }
        })
    }

    fn read_artifact(&self, id: &NodeId) -> Result<Option<StoredArtifact>, SinkError> {
        Ok(self.artifact(id))
    }

    fn write_embeddings(&self, batch: &[EmbeddingRecord]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.update(|state| {
            for record in batch {
                state.embeddings.insert(record.id.clone(), record.clone());
            }
        })
    }

    fn embedding_fingerprint(&self, id: &NodeId) -> Result<Option<ContentHash>, SinkError> {
        Ok(self
            .state
            .read()
            .embeddings
            .get(id)
            .map(|e| e.fingerprint.clone()))
    }
}
