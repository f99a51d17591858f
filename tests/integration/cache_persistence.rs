//! Summary cache durability across runs: interrupted saves, corrupt files and
//! failed artifact writes.

use crate::integration::test_utils::{leaf, root, FlakySink, Harness};
use std::fs;
use std::sync::Arc;
use summit::cache::{backup_path, temp_path, SaveOutcome};
use summit::error::EngineError;
use summit::graph::{ArtifactSink, ArtifactStore, GraphSnapshot};
use summit::orchestrator::PassSpec;
use summit::types::{CacheEntry, ContentHash, DependencyCategory, NodeId, NodeStatus};

fn snapshot() -> GraphSnapshot {
    GraphSnapshot::new()
        .with_pass("leaf-units", vec![leaf("a", "fn a() {}"), leaf("b", "fn b() {}")])
        .with_pass("project", vec![root("root", &["a", "b"])])
}

fn passes() -> Vec<PassSpec> {
    vec![PassSpec::frontier("leaf-units"), PassSpec::frontier("project")]
}

#[tokio::test]
async fn test_crash_between_stage_and_commit_keeps_previous_primary() {
    let harness = Harness::new();
    let report = harness.run(&snapshot(), &passes()).await.unwrap();
    assert!(matches!(
        report.cache_save,
        Some(SaveOutcome::Promoted { entries: 3, .. })
    ));

    let primary = harness.cache_config().path;
    let before = fs::read(&primary).unwrap();

    // Stage a diverging cache and never commit it
    let cache = harness.load_cache();
    cache.put(CacheEntry::new(
        NodeId::from("a"),
        "half-written".to_string(),
        ContentHash::of("other"),
    ));
    let staged = cache.stage().unwrap().unwrap();
    assert_eq!(staged.temp_path, temp_path(&primary));
    assert!(staged.temp_path.exists());
    drop(cache);

    assert_eq!(fs::read(&primary).unwrap(), before);
    let reloaded = harness.load_cache();
    assert_eq!(reloaded.len(), 3);
    assert_ne!(reloaded.get(&NodeId::from("a")).unwrap().artifact, "half-written");

    // The next run overwrites the leftover temporary file
    let next = harness.run(&snapshot(), &passes()).await.unwrap();
    assert_eq!(next.totals().unchanged, 3);
    assert!(matches!(next.cache_save, Some(SaveOutcome::Promoted { .. })));
    assert!(!temp_path(&primary).exists());
}

#[tokio::test]
async fn test_corrupt_primary_is_rebuilt_from_unchanged_nodes() {
    let harness = Harness::new();
    harness.run(&snapshot(), &passes()).await.unwrap();

    let primary = harness.cache_config().path;
    fs::write(&primary, b"{\"a\": {\"artifact\": ").unwrap();
    assert!(harness.load_cache().is_empty());

    let report = harness.run(&snapshot(), &passes()).await.unwrap();
    assert_eq!(report.totals().unchanged, 3);
    assert_eq!(report.total_calls(), 0);
    assert!(matches!(
        report.cache_save,
        Some(SaveOutcome::Promoted { entries: 3, .. })
    ));

    let reloaded = harness.load_cache();
    assert_eq!(reloaded.len(), 3);
    // The unreadable file is kept as the newest backup
    assert_eq!(
        fs::read(backup_path(&primary, 1)).unwrap(),
        b"{\"a\": {\"artifact\": ".to_vec()
    );
}

#[tokio::test]
async fn test_backups_rotate_on_every_promotion() {
    let harness = Harness::new();
    let primary = harness.cache_config().path;

    harness.run(&snapshot(), &passes()).await.unwrap();
    assert!(!backup_path(&primary, 1).exists());

    let first = fs::read(&primary).unwrap();
    harness.run(&snapshot(), &passes()).await.unwrap();
    assert_eq!(fs::read(backup_path(&primary, 1)).unwrap(), first);

    harness.run(&snapshot(), &passes()).await.unwrap();
    assert!(backup_path(&primary, 2).exists());
    assert!(!backup_path(&primary, 3).exists());
}

#[tokio::test]
async fn test_failed_artifact_write_leaves_cache_consistent() {
    let mut harness = Harness::new();
    let flaky = Arc::new(FlakySink::new(
        ArtifactStore::open(harness.dir.path().join("flaky.json")).unwrap(),
    ));
    let sink: Arc<dyn ArtifactSink> = flaky.clone();
    harness.sink = sink;

    let chain = |suffix: &str| {
        GraphSnapshot::new().with_pass(
            "leaf-units",
            vec![
                leaf("a", &format!("fn a() {{ {} }}", suffix)),
                // b's own source never changes
                leaf("b", "fn b() { a(); }").with_dependency("a", DependencyCategory::Callee),
            ],
        )
    };
    let passes = [PassSpec::frontier("leaf-units")];

    harness.run(&chain("v1"), &passes).await.unwrap();
    let old_b = harness.load_cache().get(&NodeId::from("b")).unwrap();

    flaky.poison("b");
    let err = harness.run(&chain("v2"), &passes).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::PersistenceWriteFailure { attempts: 2, .. }
    ));

    // a's level committed before b's failed; b's cache entry is untouched
    let cache = harness.load_cache();
    let a = cache.get(&NodeId::from("a")).unwrap();
    assert_eq!(a.content_hash, ContentHash::of("fn a() { v2 }"));
    assert_eq!(
        flaky.inner().artifact(&NodeId::from("a")).unwrap().artifact,
        a.artifact
    );
    assert_eq!(cache.get(&NodeId::from("b")).unwrap(), old_b);
    assert_eq!(
        flaky.inner().artifact(&NodeId::from("b")).unwrap().content_hash,
        ContentHash::of("fn b() { a(); }")
    );

    // Once the sink recovers, b is derived again from a's new artifact even
    // though its own hash is stable; a is already current
    let healthy = FlakySink::new(ArtifactStore::open(harness.dir.path().join("flaky.json")).unwrap());
    harness.sink = Arc::new(healthy);
    let report = harness.run(&chain("v2"), &passes).await.unwrap();
    assert_eq!(
        report.status_of(&NodeId::from("a")),
        Some(NodeStatus::Unchanged)
    );
    assert_eq!(
        report.status_of(&NodeId::from("b")),
        Some(NodeStatus::Regenerated)
    );
    let new_b = harness.load_cache().get(&NodeId::from("b")).unwrap();
    assert_ne!(new_b.dependency_fingerprint, old_b.dependency_fingerprint);
    let (payload, _) = harness.service.exchanges_for("b").pop().unwrap();
    assert!(payload.context.contains(&a.artifact));
}
