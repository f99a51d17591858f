//! Pass definitions and the default pass sequence.

use crate::error::EngineError;
use crate::schedule::{Level, LevelScheduler, ScheduleResult};
use crate::types::{Node, PassId};
use serde::{Deserialize, Serialize};

/// How a pass turns its scoped nodes into levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOrdering {
    /// Dependency frontier (Kahn levels)
    #[default]
    Frontier,
    /// Deepest containers first, one level per depth
    Depth,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSpec {
    pub id: PassId,
    #[serde(default)]
    pub ordering: LevelOrdering,
}

impl PassSpec {
    pub fn frontier(id: impl Into<PassId>) -> Self {
        Self {
            id: id.into(),
            ordering: LevelOrdering::Frontier,
        }
    }

    pub fn depth(id: impl Into<PassId>) -> Self {
        Self {
            id: id.into(),
            ordering: LevelOrdering::Depth,
        }
    }

    /// Order `nodes` into levels; a cycle or a bad depth assignment is fatal
    /// for the pass.
    pub fn schedule(&self, nodes: &[Node]) -> Result<Vec<Level>, EngineError> {
        match self.ordering {
            LevelOrdering::Frontier => match LevelScheduler::frontier(nodes) {
                ScheduleResult::Ordered(levels) => Ok(levels),
                ScheduleResult::CycleDetected(stuck) => Err(EngineError::CycleDetected {
                    pass: self.id.clone(),
                    nodes: stuck,
                }),
            },
            LevelOrdering::Depth => {
                LevelScheduler::by_depth(nodes).map_err(|source| EngineError::Schedule {
                    pass: self.id.clone(),
                    source,
                })
            }
        }
    }
}

/// Leaf units, then the type hierarchy, then containers of increasing scope,
/// then the project root.
pub fn default_passes() -> Vec<PassSpec> {
    vec![
        PassSpec::frontier("leaf-units"),
        PassSpec::frontier("method-summaries"),
        PassSpec::frontier("hierarchical-units"),
        PassSpec::frontier("source-files"),
        PassSpec::depth("directories"),
        PassSpec::depth("packages"),
        PassSpec::frontier("project"),
    ]
}
