//! Oversized inputs folded under a context budget.

use crate::integration::test_utils::{leaf, Harness};
use summit::budget::{ContextBudget, DISCRETE_SEPARATOR};
use summit::generation::{FoldSection, PayloadMode};
use summit::graph::{ArtifactSink, GraphSnapshot};
use summit::orchestrator::PassSpec;
use summit::types::{
    ArtifactRecord, ContentHash, DependencyCategory, Node, NodeId, NodeKind, NodeStatus,
};

const ITEM_CHARS: usize = 100;

fn item(index: usize) -> String {
    let head = format!("artifact {:02} ", index);
    format!("{}{}", head, "x".repeat(ITEM_CHARS - head.len()))
}

/// A container over 50 stored child artifacts of 25 units each. Rendered
/// with its heading the input is a little over three times a 406-unit budget.
fn fan_in_harness(name: Option<&str>) -> (Harness, GraphSnapshot) {
    let mut harness = Harness::new();
    harness.budget = ContextBudget::with_units(406, 406, 40);

    let records: Vec<ArtifactRecord> = (0..50)
        .map(|i| ArtifactRecord {
            id: NodeId::from(format!("child-{:02}", i)),
            artifact: item(i),
            content_hash: ContentHash::of(format!("child-{:02}", i)),
            dependency_fingerprint: None,
        })
        .collect();
    harness.sink.write_artifacts(&records).unwrap();

    let mut node = Node::new("c", NodeKind::Container, ContentHash::of("c"));
    for record in &records {
        node = node.with_dependency(record.id.clone(), DependencyCategory::Child);
    }
    if let Some(name) = name {
        node = node.with_name(name);
    }

    let snapshot = GraphSnapshot::new().with_pass("source-files", vec![node]);
    (harness, snapshot)
}

#[tokio::test]
async fn test_fan_in_folds_in_budget_sized_groups() {
    let (harness, snapshot) = fan_in_harness(None);

    let report = harness
        .run(&snapshot, &[PassSpec::frontier("source-files")])
        .await
        .unwrap();
    assert_eq!(
        report.status_of(&NodeId::from("c")),
        Some(NodeStatus::Regenerated)
    );
    assert_eq!(report.total_calls(), 4);

    let exchanges = harness.service.exchanges_for("c");
    assert_eq!(exchanges.len(), 4);

    let mut seen = Vec::new();
    for (step, (payload, _)) in exchanges.iter().enumerate() {
        assert_eq!(
            payload.mode,
            PayloadMode::Fold {
                section: FoldSection::Category(DependencyCategory::Child),
                step: step + 1,
                total_steps: 4,
            }
        );
        assert!(harness.budget.fits(&payload.context));
        // Whole items only
        for piece in payload.context.split(DISCRETE_SEPARATOR) {
            assert_eq!(piece.chars().count(), ITEM_CHARS);
            seen.push(piece.to_string());
        }
    }
    let expected: Vec<String> = (0..50).map(item).collect();
    assert_eq!(seen, expected);

    let sizes: Vec<usize> = exchanges
        .iter()
        .map(|(p, _)| p.context.split(DISCRETE_SEPARATOR).count())
        .collect();
    assert_eq!(sizes, vec![15, 15, 15, 5]);

    // Each step folds into the previous step's result
    assert!(exchanges[0].0.running_result.is_none());
    for pair in exchanges.windows(2) {
        assert_eq!(pair[1].0.running_result.as_deref(), Some(pair[0].1.as_str()));
    }

    let stored = harness.sink.read_artifact(&NodeId::from("c")).unwrap().unwrap();
    assert_eq!(stored.artifact, exchanges[3].1);
}

#[tokio::test]
async fn test_named_node_seeds_the_fold() {
    let (harness, snapshot) = fan_in_harness(Some("widgets"));

    harness
        .run(&snapshot, &[PassSpec::frontier("source-files")])
        .await
        .unwrap();

    let exchanges = harness.service.exchanges_for("c");
    let seed = exchanges[0].0.running_result.as_deref().unwrap();
    assert!(seed.contains("container named 'widgets'"));
    assert_eq!(exchanges.len(), 4);
}

#[tokio::test]
async fn test_fitting_input_is_a_single_call() {
    let (mut harness, snapshot) = fan_in_harness(None);
    harness.budget = ContextBudget::new(8192);

    let report = harness
        .run(&snapshot, &[PassSpec::frontier("source-files")])
        .await
        .unwrap();
    assert_eq!(report.total_calls(), 1);

    let (payload, _) = harness.service.exchanges_for("c").pop().unwrap();
    assert_eq!(payload.mode, PayloadMode::Complete);
    assert!(payload.context.starts_with("Contents:\n"));
}

#[tokio::test]
async fn test_oversized_source_folds_in_overlapping_windows() {
    let mut harness = Harness::new();
    harness.budget = ContextBudget::with_units(50, 25, 5);

    let content: String = (0..400)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let snapshot = GraphSnapshot::new().with_pass("leaf-units", vec![leaf("big", &content)]);

    harness
        .run(&snapshot, &[PassSpec::frontier("leaf-units")])
        .await
        .unwrap();

    let exchanges = harness.service.exchanges_for("big");
    assert_eq!(exchanges.len(), 5);
    assert!(exchanges.iter().all(|(p, _)| matches!(
        p.mode,
        PayloadMode::Fold {
            section: FoldSection::RawContent,
            ..
        }
    )));

    // 20 chars of overlap between consecutive windows
    let mut rebuilt = String::new();
    for (index, (payload, _)) in exchanges.iter().enumerate() {
        let skip = if index == 0 { 0 } else { 20 };
        rebuilt.extend(payload.context.chars().skip(skip));
    }
    assert_eq!(rebuilt, content);
}
