//! Multi-run scenarios for the per-node decision waterfall.

use crate::integration::test_utils::{container, leaf, root, Harness};
use summit::error::EngineError;
use summit::graph::{ArtifactSink, GraphSnapshot};
use summit::orchestrator::PassSpec;
use summit::types::{ContentHash, DependencyCategory, Node, NodeId, NodeKind, NodeStatus};

fn status(report: &summit::RunReport, id: &str) -> Option<NodeStatus> {
    report.status_of(&NodeId::from(id))
}

fn chain(a_content: &str) -> GraphSnapshot {
    GraphSnapshot::new().with_pass(
        "leaf-units",
        vec![
            leaf("a", a_content),
            // b's own hash stays fixed across runs
            Node::new("b", NodeKind::LeafUnit, ContentHash::of("fn b() { a() }"))
                .with_raw_content("fn b() { a() }")
                .with_dependency("a", DependencyCategory::Callee),
        ],
    )
}

fn leaf_pass() -> Vec<PassSpec> {
    vec![PassSpec::frontier("leaf-units")]
}

#[tokio::test]
async fn test_two_node_chain_across_three_runs() {
    let harness = Harness::new();

    let first = harness.run(&chain("fn a() {}"), &leaf_pass()).await.unwrap();
    assert_eq!(status(&first, "a"), Some(NodeStatus::Regenerated));
    assert_eq!(status(&first, "b"), Some(NodeStatus::Regenerated));
    assert_eq!(first.total_calls(), 2);

    let second = harness.run(&chain("fn a() {}"), &leaf_pass()).await.unwrap();
    assert_eq!(status(&second, "a"), Some(NodeStatus::Unchanged));
    assert_eq!(status(&second, "b"), Some(NodeStatus::Unchanged));
    assert_eq!(second.total_calls(), 0);

    let third = harness
        .run(&chain("fn a() { let x = 1; }"), &leaf_pass())
        .await
        .unwrap();
    assert_eq!(status(&third, "a"), Some(NodeStatus::Regenerated));
    assert_eq!(status(&third, "b"), Some(NodeStatus::Regenerated));
    assert_eq!(harness.service.calls(), 4);

    // b was rebuilt from a's new artifact
    let b_calls = harness.service.exchanges_for("b");
    let (_, a_reply) = harness.service.exchanges_for("a").pop().unwrap();
    assert!(b_calls.last().unwrap().0.context.contains(&a_reply));
}

/// leaf units -> source files -> directory (depth-ordered) -> project root
fn project(l2_content: &str) -> GraphSnapshot {
    GraphSnapshot::new()
        .with_pass(
            "leaf-units",
            vec![
                leaf("l1", "fn one() {}"),
                leaf("l2", l2_content),
                leaf("l3", "fn three() { one() }").with_dependency("l1", DependencyCategory::Callee),
            ],
        )
        .with_pass(
            "source-files",
            vec![container("f1", &["l1", "l2"]), container("f2", &["l3"])],
        )
        .with_pass(
            "directories",
            vec![container("d", &["f1", "f2"]).with_depth(1)],
        )
        .with_pass("project", vec![root("root", &["d"]).with_name("demo")])
}

fn project_passes() -> Vec<PassSpec> {
    vec![
        PassSpec::frontier("leaf-units"),
        PassSpec::frontier("source-files"),
        PassSpec::depth("directories"),
        PassSpec::frontier("project"),
    ]
}

#[tokio::test]
async fn test_unchanged_graph_makes_no_calls() {
    let harness = Harness::new();
    let first = harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();
    assert_eq!(first.totals().regenerated, 7);
    assert_eq!(first.total_calls(), 7);

    let second = harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();
    assert_eq!(second.totals().unchanged, 7);
    assert_eq!(second.total_calls(), 0);
    assert_eq!(harness.service.calls(), 7);
}

#[tokio::test]
async fn test_change_propagates_to_ancestors_only() {
    let harness = Harness::new();
    harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();
    harness.service.clear_log();

    let report = harness
        .run(&project("fn two() { three() }"), &project_passes())
        .await
        .unwrap();

    for id in ["l2", "f1", "d", "root"] {
        assert_eq!(status(&report, id), Some(NodeStatus::Regenerated), "{}", id);
    }
    for id in ["l1", "l3", "f2"] {
        assert_eq!(status(&report, id), Some(NodeStatus::Unchanged), "{}", id);
    }
    assert_eq!(report.total_calls(), 4);

    let called: Vec<String> = harness
        .service
        .called_nodes()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(called, vec!["d", "f1", "l2", "root"]);
}

#[tokio::test]
async fn test_lost_artifacts_are_restored_from_cache() {
    let mut harness = Harness::new();
    harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();

    harness.lose_artifacts();
    let restored = harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();
    assert_eq!(restored.totals().restored, 7);
    assert_eq!(restored.total_calls(), 0);
    assert!(harness
        .sink
        .read_artifact(&NodeId::from("root"))
        .unwrap()
        .is_some());

    let settled = harness
        .run(&project("fn two() {}"), &project_passes())
        .await
        .unwrap();
    assert_eq!(settled.totals().unchanged, 7);
}

fn fan_in() -> GraphSnapshot {
    GraphSnapshot::new()
        .with_pass("leaf-units", vec![leaf("a", "fn a() {}"), leaf("b", "fn b() {}")])
        .with_pass("project", vec![root("root", &["a", "b"])])
}

fn fan_in_passes() -> Vec<PassSpec> {
    vec![PassSpec::frontier("leaf-units"), PassSpec::frontier("project")]
}

#[tokio::test]
async fn test_failed_dependency_degrades_context_then_recovers() {
    let harness = Harness::new();
    harness.service.fail_fatally("b");

    let first = harness.run(&fan_in(), &fan_in_passes()).await.unwrap();
    assert_eq!(status(&first, "b"), Some(NodeStatus::Failed));
    assert_eq!(status(&first, "root"), Some(NodeStatus::Regenerated));
    let failures: Vec<_> = first.failures().map(|f| f.node_id.to_string()).collect();
    assert_eq!(failures, vec!["b"]);

    let (payload, _) = harness.service.exchanges_for("root").pop().unwrap();
    assert!(payload.context.contains("summary of a"));
    assert!(!payload.context.contains("summary of b"));
    assert!(harness
        .sink
        .read_artifact(&NodeId::from("b"))
        .unwrap()
        .is_none());

    harness.service.heal("b");
    let second = harness.run(&fan_in(), &fan_in_passes()).await.unwrap();
    assert_eq!(status(&second, "a"), Some(NodeStatus::Unchanged));
    assert_eq!(status(&second, "b"), Some(NodeStatus::Regenerated));
    assert_eq!(status(&second, "root"), Some(NodeStatus::Regenerated));

    let (payload, _) = harness.service.exchanges_for("root").pop().unwrap();
    assert!(payload.context.contains("summary of a"));
    assert!(payload.context.contains("summary of b"));
}

#[tokio::test]
async fn test_container_without_any_input_fails_without_calls() {
    let harness = Harness::new();
    harness.service.fail_fatally("a");
    let snapshot = GraphSnapshot::new()
        .with_pass("leaf-units", vec![leaf("a", "fn a() {}")])
        .with_pass("source-files", vec![container("file", &["a"])]);

    let report = harness
        .run(
            &snapshot,
            &[
                PassSpec::frontier("leaf-units"),
                PassSpec::frontier("source-files"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(status(&report, "file"), Some(NodeStatus::Failed));
    // Only a's single refused attempt reached the service
    assert_eq!(harness.service.calls(), 1);
    let message = report
        .failures()
        .find(|f| f.node_id.as_str() == "file")
        .unwrap()
        .message
        .clone();
    assert!(message.contains("no input"));
}

#[tokio::test]
async fn test_transient_failures_are_retried_within_the_run() {
    let harness = Harness::new();
    harness.service.fail_transiently("a", 2);

    let report = harness.run(&chain("fn a() {}"), &leaf_pass()).await.unwrap();
    assert_eq!(status(&report, "a"), Some(NodeStatus::Regenerated));
    assert_eq!(status(&report, "b"), Some(NodeStatus::Regenerated));
    // Two refused attempts and one success for a, one call for b
    assert_eq!(report.total_calls(), 4);
}

#[tokio::test]
async fn test_transient_exhaustion_fails_the_node() {
    let harness = Harness::new();
    harness.service.fail_transiently("a", 5);

    let report = harness.run(&chain("fn a() {}"), &leaf_pass()).await.unwrap();
    assert_eq!(status(&report, "a"), Some(NodeStatus::Failed));
    // b still has its raw content
    assert_eq!(status(&report, "b"), Some(NodeStatus::Regenerated));
    assert_eq!(report.passes[0].levels[0].calls, 3);
}

#[tokio::test]
async fn test_cycle_is_fatal_and_makes_no_calls() {
    let harness = Harness::new();
    let snapshot = GraphSnapshot::new()
        .with_pass(
            "leaf-units",
            vec![
                leaf("x", "fn x() { y() }").with_dependency("y", DependencyCategory::Callee),
                leaf("y", "fn y() { x() }").with_dependency("x", DependencyCategory::Callee),
                leaf("z", "fn z() {}"),
            ],
        )
        .with_pass("project", vec![root("root", &["z"])]);

    let err = harness.run(&snapshot, &fan_in_passes()).await.unwrap_err();
    match err {
        EngineError::CycleDetected { pass, mut nodes } => {
            assert_eq!(pass.as_str(), "leaf-units");
            nodes.sort();
            assert_eq!(nodes, vec![NodeId::from("x"), NodeId::from("y")]);
        }
        other => panic!("expected cycle, got {other:?}"),
    }
    assert_eq!(harness.service.calls(), 0);
    // The cache is still saved on the way out
    assert!(harness.cache_config().path.exists());
}
