//! External collaborators: the graph provider that scopes nodes per pass,
//! and the artifact sink that stores derived artifacts and embeddings.

use crate::error::{GraphError, SinkError};
use crate::types::{ArtifactRecord, ContentHash, EmbeddingRecord, Node, NodeId, PassId, StoredArtifact};

mod snapshot;
mod store;

pub use snapshot::GraphSnapshot;
pub use store::ArtifactStore;

/// Read-only view of the graph, scoped per pass
pub trait GraphProvider: Send + Sync {
    /// Nodes of one pass with their dependency edges. Unknown passes are empty.
    fn list_scoped_nodes(&self, pass: &PassId) -> Result<Vec<Node>, GraphError>;
}

/// Durable store for derived artifacts
pub trait ArtifactSink: Send + Sync {
    /// Persist a batch; either the whole batch is stored or an error is returned.
    fn write_artifacts(&self, batch: &[ArtifactRecord]) -> Result<(), SinkError>;

    fn read_artifact(&self, id: &NodeId) -> Result<Option<StoredArtifact>, SinkError>;

    fn write_embeddings(&self, batch: &[EmbeddingRecord]) -> Result<(), SinkError>;

    /// Fingerprint of the artifact text the stored embedding was computed from
    fn embedding_fingerprint(&self, id: &NodeId) -> Result<Option<ContentHash>, SinkError>;
}
