//! Property-based tests for level scheduling

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use summit::schedule::{LevelScheduler, ScheduleResult};
use summit::types::{ContentHash, DependencyCategory, Node, NodeId, NodeKind};

/// Random DAG: node `i` may only depend on nodes with a smaller index, plus
/// some dependencies on ids outside the scope.
fn dag_strategy() -> impl Strategy<Value = Vec<Node>> {
    (1usize..40).prop_flat_map(|count| {
        prop::collection::vec(
            (prop::collection::vec(any::<prop::sample::Index>(), 0..4), any::<bool>()),
            count,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (deps, external))| {
                    let mut node = Node::new(
                        format!("n{:02}", i),
                        NodeKind::LeafUnit,
                        ContentHash::of(format!("n{}", i)),
                    );
                    if i > 0 {
                        for dep in deps {
                            node = node.with_dependency(
                                format!("n{:02}", dep.index(i)),
                                DependencyCategory::Callee,
                            );
                        }
                    }
                    if external {
                        node = node.with_dependency("outside", DependencyCategory::Reference);
                    }
                    node
                })
                .collect()
        })
    })
}

#[test]
fn test_frontier_levels_respect_dependencies() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&dag_strategy(), |nodes| {
            let levels = match LevelScheduler::frontier(&nodes) {
                ScheduleResult::Ordered(levels) => levels,
                ScheduleResult::CycleDetected(stuck) => {
                    return Err(TestCaseError::fail(format!("unexpected cycle: {:?}", stuck)))
                }
            };

            let mut level_of: HashMap<&NodeId, usize> = HashMap::new();
            for level in &levels {
                prop_assert!(!level.is_empty());
                for id in &level.node_ids {
                    prop_assert!(level_of.insert(id, level.index).is_none(), "{} scheduled twice", id);
                }
            }
            prop_assert_eq!(level_of.len(), nodes.len());

            for node in &nodes {
                let own = level_of[&node.id];
                let mut deepest_dep = None;
                for dep in node.dependency_ids() {
                    if let Some(dep_level) = level_of.get(dep) {
                        prop_assert!(*dep_level < own);
                        deepest_dep = deepest_dep.max(Some(*dep_level));
                    }
                }
                // Scheduled as early as possible
                prop_assert_eq!(own, deepest_dep.map_or(0, |d| d + 1));
            }

            Ok(())
        })
        .unwrap();
}

#[test]
fn test_back_edge_is_reported_as_cycle() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(dag_strategy(), any::<prop::sample::Index>()), |(mut nodes, pick)| {
            prop_assume!(nodes.len() > 1);
            // Close a loop between the last node and one of its predecessors
            let last = nodes.len() - 1;
            let target = pick.index(last);
            let last_id = nodes[last].id.clone();
            nodes[target] = nodes[target]
                .clone()
                .with_dependency(last_id.clone(), DependencyCategory::Callee);
            nodes[last] = nodes[last]
                .clone()
                .with_dependency(nodes[target].id.clone(), DependencyCategory::Callee);

            match LevelScheduler::frontier(&nodes) {
                ScheduleResult::CycleDetected(stuck) => {
                    let stuck: HashSet<NodeId> = stuck.into_iter().collect();
                    prop_assert!(stuck.contains(&last_id));
                    prop_assert!(stuck.contains(&nodes[target].id));
                }
                ScheduleResult::Ordered(_) => {
                    return Err(TestCaseError::fail("cycle was not detected"));
                }
            }
            Ok(())
        })
        .unwrap();
}
