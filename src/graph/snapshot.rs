//! Graph snapshot: a JSON document listing the scoped nodes of every pass.
//!
//! ```json
//! { "passes": { "leaf-units": [ { "id": "...", "kind": "leaf_unit", ... } ] } }
//! ```

use super::GraphProvider;
use crate::error::GraphError;
use crate::types::{Node, PassId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    passes: BTreeMap<PassId, Vec<Node>>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let bytes = fs::read(path)?;
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| GraphError::Invalid(format!("{}: {}", path.display(), e)))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn with_pass(mut self, pass: impl Into<PassId>, nodes: Vec<Node>) -> Self {
        self.passes.insert(pass.into(), nodes);
        self
    }

    pub fn pass_ids(&self) -> impl Iterator<Item = &PassId> {
        self.passes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.passes.values().map(Vec::len).sum()
    }

    /// Node ids must be non-empty and unique within a pass.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (pass, nodes) in &self.passes {
            let mut seen = HashSet::with_capacity(nodes.len());
            for node in nodes {
                if node.id.as_str().is_empty() {
                    return Err(GraphError::Invalid(format!(
                        "pass {} contains a node with an empty id",
                        pass
                    )));
                }
                if !seen.insert(&node.id) {
                    return Err(GraphError::Invalid(format!(
                        "pass {} lists node {} more than once",
                        pass, node.id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl GraphProvider for GraphSnapshot {
    fn list_scoped_nodes(&self, pass: &PassId) -> Result<Vec<Node>, GraphError> {
        Ok(self.passes.get(pass).cloned().unwrap_or_default())
    }
}
