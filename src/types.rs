//! Core types for the derivation engine.
//!
//! Nodes are supplied by an external graph provider and are read-only to the
//! engine. Identity is the `NodeId`; the `ContentHash` only decides whether a
//! previously derived artifact is still valid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable node identifier assigned by the graph provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Hex-encoded digest of a node's raw input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// BLAKE3 digest of `bytes`
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(blake3::hash(bytes.as_ref()).as_bytes()))
    }

    /// Wrap a digest computed elsewhere (providers may use their own hash).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Digest over the `(dependency id, artifact)` pairs a node is derived
    /// from, independent of their order. `None` when there are none.
    pub fn of_dependencies<'a>(
        pairs: impl IntoIterator<Item = (&'a NodeId, &'a str)>,
    ) -> Option<Self> {
        let mut pairs: Vec<(&NodeId, &str)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = blake3::Hasher::new();
        for (id, artifact) in pairs {
            hasher.update(&(id.as_str().len() as u64).to_le_bytes());
            hasher.update(id.as_str().as_bytes());
            hasher.update(&(artifact.len() as u64).to_le_bytes());
            hasher.update(artifact.as_bytes());
        }
        Some(Self(hex::encode(hasher.finalize().as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    LeafUnit,
    HierarchicalUnit,
    Container,
    Root,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::LeafUnit => "unit",
            NodeKind::HierarchicalUnit => "type",
            NodeKind::Container => "container",
            NodeKind::Root => "project",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::LeafUnit => "leaf_unit",
            NodeKind::HierarchicalUnit => "hierarchical_unit",
            NodeKind::Container => "container",
            NodeKind::Root => "root",
        };
        f.write_str(name)
    }
}

/// Role a dependency's artifact plays in the dependent's derivation
///
/// Declaration order is the fallback fold order for categories a kind's
/// fold plan does not list.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCategory {
    Ancestor,
    Member,
    Caller,
    Callee,
    #[default]
    Child,
    Reference,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 6] = [
        DependencyCategory::Ancestor,
        DependencyCategory::Member,
        DependencyCategory::Caller,
        DependencyCategory::Callee,
        DependencyCategory::Child,
        DependencyCategory::Reference,
    ];

    pub fn heading(&self) -> &'static str {
        match self {
            DependencyCategory::Ancestor => "Inherited from",
            DependencyCategory::Member => "Members",
            DependencyCategory::Caller => "Called by",
            DependencyCategory::Callee => "Calls",
            DependencyCategory::Child => "Contents",
            DependencyCategory::Reference => "References",
        }
    }
}

/// Edge from a node to one of the nodes whose artifact it consumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub id: NodeId,
    #[serde(default)]
    pub category: DependencyCategory,
}

/// A unit of derivable content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub content_hash: ContentHash,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    /// Display name, used to seed folds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nesting depth for depth-ordered passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, content_hash: ContentHash) -> Self {
        Self {
            id: id.into(),
            kind,
            content_hash,
            dependencies: Vec::new(),
            raw_content: None,
            name: None,
            depth: None,
        }
    }

    pub fn with_dependency(mut self, id: impl Into<NodeId>, category: DependencyCategory) -> Self {
        self.dependencies.push(Dependency {
            id: id.into(),
            category,
        });
        self
    }

    pub fn with_raw_content(mut self, content: impl Into<String>) -> Self {
        self.raw_content = Some(content.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn dependency_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.dependencies.iter().map(|d| &d.id)
    }
}

/// Persisted derivation result for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub node_id: NodeId,
    pub artifact: String,
    pub content_hash: ContentHash,
    /// Dependency artifacts the entry was derived from, see
    /// [`ContentHash::of_dependencies`]
    pub dependency_fingerprint: Option<ContentHash>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(node_id: NodeId, artifact: String, content_hash: ContentHash) -> Self {
        Self {
            node_id,
            artifact,
            content_hash,
            dependency_fingerprint: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_dependency_fingerprint(mut self, fingerprint: Option<ContentHash>) -> Self {
        self.dependency_fingerprint = fingerprint;
        self
    }

    /// Still valid for a node with `content_hash` whose dependencies now
    /// fingerprint to `fingerprint`.
    pub fn is_current(&self, content_hash: &ContentHash, fingerprint: Option<&ContentHash>) -> bool {
        self.content_hash == *content_hash && self.dependency_fingerprint.as_ref() == fingerprint
    }

    pub fn to_record(&self) -> ArtifactRecord {
        ArtifactRecord {
            id: self.node_id.clone(),
            artifact: self.artifact.clone(),
            content_hash: self.content_hash.clone(),
            dependency_fingerprint: self.dependency_fingerprint.clone(),
        }
    }
}

/// Outcome of processing one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Persisted artifact is still valid; nothing to do
    Unchanged,
    /// Recovered from the in-memory cache; must be re-persisted
    Restored,
    /// Freshly derived through the generation service
    Regenerated,
    Failed,
}

impl NodeStatus {
    /// Whether the result must be written to the sink at commit time.
    pub fn needs_persist(&self) -> bool {
        matches!(self, NodeStatus::Restored | NodeStatus::Regenerated)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Unchanged => "unchanged",
            NodeStatus::Restored => "restored",
            NodeStatus::Regenerated => "regenerated",
            NodeStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Item of a bulk write to the artifact sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: NodeId,
    pub artifact: String,
    pub content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_fingerprint: Option<ContentHash>,
}

/// What the sink hands back for a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub artifact: String,
    pub content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_fingerprint: Option<ContentHash>,
}

impl StoredArtifact {
    pub fn is_current(&self, content_hash: &ContentHash, fingerprint: Option<&ContentHash>) -> bool {
        self.content_hash == *content_hash && self.dependency_fingerprint.as_ref() == fingerprint
    }
}

/// Vector embedding of a node's artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: NodeId,
    pub vector: Vec<f32>,
    /// Digest of the artifact text the vector was computed from
    pub fingerprint: ContentHash,
}

/// Name of an orchestrated pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(String);

impl PassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PassId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
