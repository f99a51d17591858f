//! Level Scheduler
//!
//! Orders a scoped node set into levels: every in-scope dependency of a node
//! in level `k` sits in a level below `k`. Dependencies on nodes outside the
//! scope are treated as satisfied.

use crate::error::ScheduleError;
use crate::types::{Node, NodeId};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Nodes that can be processed concurrently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub index: usize,
    pub node_ids: Vec<NodeId>,
}

impl Level {
    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

/// Outcome of frontier scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleResult {
    Ordered(Vec<Level>),
    /// Nodes left unassigned when an iteration made no progress
    CycleDetected(Vec<NodeId>),
}

pub struct LevelScheduler;

impl LevelScheduler {
    /// Iterative frontier expansion.
    ///
    /// Level 0 holds the nodes with no in-scope dependency; each following
    /// level holds the nodes whose in-scope dependencies are all assigned.
    /// An iteration that assigns nothing means the remaining nodes sit on or
    /// behind a cycle; they are reported rather than broken arbitrarily.
    pub fn frontier(nodes: &[Node]) -> ScheduleResult {
        let scope = unique_nodes(nodes);
        let in_scope: HashSet<&NodeId> = scope.iter().map(|n| &n.id).collect();

        // Remaining in-scope dependency count and reverse edges
        let mut pending: HashMap<&NodeId, usize> = HashMap::with_capacity(scope.len());
        let mut dependents: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for node in &scope {
            let deps: HashSet<&NodeId> = node
                .dependency_ids()
                .filter(|dep| in_scope.contains(dep))
                .collect();
            pending.insert(&node.id, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(&node.id);
            }
        }

        let mut frontier: Vec<&NodeId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut levels = Vec::new();
        let mut assigned = 0;
        while !frontier.is_empty() {
            frontier.sort();
            assigned += frontier.len();

            let mut next = Vec::new();
            for id in &frontier {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }

            levels.push(Level {
                index: levels.len(),
                node_ids: frontier.into_iter().cloned().collect(),
            });
            frontier = next;
        }

        if assigned < scope.len() {
            let mut stuck: Vec<NodeId> = pending
                .into_iter()
                .filter(|(_, count)| *count > 0)
                .map(|(id, _)| id.clone())
                .collect();
            stuck.sort();
            return ScheduleResult::CycleDetected(stuck);
        }

        debug!(
            nodes = scope.len(),
            levels = levels.len(),
            "Scheduled scope by dependency frontier"
        );
        ScheduleResult::Ordered(levels)
    }

    /// Order by nesting depth, deepest first.
    ///
    /// Valid only when every in-scope dependency is strictly deeper than its
    /// dependent; that is checked and violations are returned as errors.
    pub fn by_depth(nodes: &[Node]) -> Result<Vec<Level>, ScheduleError> {
        let scope = unique_nodes(nodes);

        let mut depths: HashMap<&NodeId, u32> = HashMap::with_capacity(scope.len());
        for node in &scope {
            let depth = node
                .depth
                .ok_or_else(|| ScheduleError::MissingDepth(node.id.clone()))?;
            depths.insert(&node.id, depth);
        }

        let mut by_depth: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for node in &scope {
            let depth = depths[&node.id];
            for dep in node.dependency_ids() {
                if let Some(dep_depth) = depths.get(dep) {
                    if *dep_depth <= depth {
                        return Err(ScheduleError::NonMonotonicDepth {
                            node: node.id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
            by_depth.entry(depth).or_default().push(node.id.clone());
        }

        Ok(by_depth
            .into_values()
            .rev()
            .enumerate()
            .map(|(index, mut node_ids)| {
                node_ids.sort();
                Level { index, node_ids }
            })
            .collect())
    }
}

/// Drop repeated ids, keeping the first occurrence.
fn unique_nodes(nodes: &[Node]) -> Vec<&Node> {
    let mut seen = HashSet::with_capacity(nodes.len());
    let mut unique = Vec::with_capacity(nodes.len());
    for node in nodes {
        if seen.insert(&node.id) {
            unique.push(node);
        } else {
            warn!(node_id = %node.id, "Duplicate node in scope ignored");
        }
    }
    unique
}
