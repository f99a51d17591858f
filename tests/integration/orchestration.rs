//! Level barriers, cancellation and the embedding stage seen from a full run.

use crate::integration::test_utils::{leaf, root, Harness, ScriptedService};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use summit::budget::ContextBudget;
use summit::cache::SummaryCache;
use summit::embedding::{EmbeddingStage, FakeEmbedder};
use summit::error::GenerationError;
use summit::generation::{ContextPayload, GenerationEngine, GenerationService, RetryPolicy};
use summit::graph::{ArtifactStore, GraphSnapshot};
use summit::orchestrator::{Orchestrator, PassSpec};
use summit::types::{DependencyCategory, NodeId, NodeStatus};
use tokio_util::sync::CancellationToken;

fn layered() -> GraphSnapshot {
    layered_with("fn a() {}")
}

fn layered_with(a_body: &str) -> GraphSnapshot {
    GraphSnapshot::new()
        .with_pass(
            "leaf-units",
            vec![
                leaf("a", a_body),
                leaf("b", "fn b() { a() }").with_dependency("a", DependencyCategory::Callee),
                leaf("c", "fn c() { a() }").with_dependency("a", DependencyCategory::Callee),
            ],
        )
        .with_pass("project", vec![root("root", &["b", "c"])])
}

fn passes() -> Vec<PassSpec> {
    vec![PassSpec::frontier("leaf-units"), PassSpec::frontier("project")]
}

#[tokio::test]
async fn test_dependents_see_artifacts_of_earlier_levels() {
    for workers in [1, 4] {
        let mut harness = Harness::new();
        harness.workers = workers;

        let report = harness.run(&layered(), &passes()).await.unwrap();
        assert_eq!(report.passes[0].levels.len(), 2);
        assert_eq!(report.passes[0].levels[1].total, 2);

        let (_, a_reply) = harness.service.exchanges_for("a").pop().unwrap();
        for id in ["b", "c"] {
            let (payload, _) = harness.service.exchanges_for(id).pop().unwrap();
            assert!(payload.context.contains(&a_reply), "{} with {} workers", id, workers);
        }
        let (payload, _) = harness.service.exchanges_for("root").pop().unwrap();
        assert!(payload.context.starts_with("Contents:\n"));
    }
}

/// Cancels the run while generating a chosen node
struct CancellingService {
    inner: Arc<ScriptedService>,
    trigger: NodeId,
    token: Mutex<Option<CancellationToken>>,
}

#[async_trait]
impl GenerationService for CancellingService {
    async fn generate(&self, payload: &ContextPayload) -> Result<String, GenerationError> {
        if payload.node_id == self.trigger {
            if let Some(token) = self.token.lock().as_ref() {
                token.cancel();
            }
        }
        self.inner.generate(payload).await
    }

    fn name(&self) -> &str {
        "cancelling"
    }
}

/// Orchestrator over `snapshot` that cancels itself while generating `trigger`
fn cancelling_orchestrator(harness: &Harness, snapshot: GraphSnapshot, trigger: &str) -> Orchestrator {
    let service = Arc::new(CancellingService {
        inner: harness.service.clone(),
        trigger: NodeId::from(trigger),
        token: Mutex::new(None),
    });
    let engine = GenerationEngine::new(service.clone(), ContextBudget::new(8192))
        .with_retry(RetryPolicy::immediate(1));
    let orchestrator = Orchestrator::new(
        Arc::new(snapshot),
        Arc::clone(&harness.sink),
        Arc::new(harness.load_cache()),
        Arc::new(engine),
        2,
    )
    .with_passes(passes());
    *service.token.lock() = Some(orchestrator.cancellation_token());
    orchestrator
}

#[tokio::test]
async fn test_cancellation_stops_at_the_next_level() {
    let harness = Harness::new();
    let orchestrator = cancelling_orchestrator(&harness, layered(), "a");

    let report = orchestrator.run().await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.passes.len(), 1);
    assert_eq!(
        report.status_of(&NodeId::from("a")),
        Some(NodeStatus::Regenerated)
    );
    assert_eq!(report.status_of(&NodeId::from("b")), None);
    assert_eq!(harness.service.calls(), 1);

    // The completed level was committed and saved
    assert!(harness.load_cache().get(&NodeId::from("a")).is_some());

    let resumed = harness.run(&layered(), &passes()).await.unwrap();
    assert!(!resumed.cancelled);
    assert_eq!(
        resumed.status_of(&NodeId::from("a")),
        Some(NodeStatus::Unchanged)
    );
    assert_eq!(resumed.totals().regenerated, 3);
}

#[tokio::test]
async fn test_interrupted_run_still_propagates_to_dependents() {
    let harness = Harness::new();
    harness.run(&layered(), &passes()).await.unwrap();
    let old_b = harness.load_cache().get(&NodeId::from("b")).unwrap();

    // a changes and its level commits, then the run stops before b and c
    let changed = layered_with("fn a() { init(); }");
    let interrupted = cancelling_orchestrator(&harness, changed.clone(), "a")
        .run()
        .await
        .unwrap();
    assert!(interrupted.cancelled);
    assert_eq!(
        interrupted.status_of(&NodeId::from("a")),
        Some(NodeStatus::Regenerated)
    );
    assert_eq!(interrupted.status_of(&NodeId::from("b")), None);

    harness.service.clear_log();
    let resumed = harness.run(&changed, &passes()).await.unwrap();
    assert_eq!(
        resumed.status_of(&NodeId::from("a")),
        Some(NodeStatus::Unchanged)
    );
    for id in ["b", "c", "root"] {
        assert_eq!(
            resumed.status_of(&NodeId::from(id)),
            Some(NodeStatus::Regenerated),
            "{}",
            id
        );
    }

    assert!(harness.service.exchanges_for("a").is_empty());
    let new_a = harness.load_cache().get(&NodeId::from("a")).unwrap().artifact;
    let (payload, _) = harness.service.exchanges_for("b").pop().unwrap();
    assert!(payload.context.contains(&new_a));
    assert_ne!(harness.load_cache().get(&NodeId::from("b")).unwrap(), old_b);

    // Settled again: nothing left to do
    let settled = harness.run(&changed, &passes()).await.unwrap();
    assert_eq!(settled.total_calls(), 0);
}

#[tokio::test]
async fn test_embedding_follows_changed_artifacts_only() {
    let harness = Harness::new();
    let leaves = |a_content: &str| {
        GraphSnapshot::new().with_pass(
            "leaf-units",
            vec![leaf("a", a_content), leaf("b", "fn b() {}")],
        )
    };
    let passes = [PassSpec::frontier("leaf-units")];
    let embed = || EmbeddingStage::new(Arc::new(FakeEmbedder::new(16)), 1);

    let first = harness
        .orchestrator(&leaves("fn a() {}"), &passes)
        .with_embedding(embed())
        .run()
        .await
        .unwrap();
    let embedding = first.embedding.unwrap();
    assert_eq!((embedding.candidates, embedding.embedded), (2, 2));

    // A longer body gives a a different artifact text
    let second = harness
        .orchestrator(&leaves("fn a() { return; }"), &passes)
        .with_embedding(embed())
        .run()
        .await
        .unwrap();
    let embedding = second.embedding.unwrap();
    assert_eq!(embedding.embedded, 1);
    assert_eq!(embedding.skipped, 1);

    let store = ArtifactStore::open(&harness.store_path).unwrap();
    assert_eq!(store.embedding_count(), 2);
    assert_eq!(store.embedding(&NodeId::from("a")).unwrap().vector.len(), 16);
}

#[tokio::test]
async fn test_in_memory_components_need_no_files() {
    let service = ScriptedService::new();
    let engine = GenerationEngine::new(service.clone(), ContextBudget::new(8192));
    let sink = Arc::new(ArtifactStore::in_memory());
    let orchestrator = Orchestrator::new(
        Arc::new(layered()),
        sink.clone(),
        Arc::new(SummaryCache::in_memory()),
        Arc::new(engine),
        3,
    )
    .with_passes(passes());

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.totals().regenerated, 4);
    assert_eq!(sink.len(), 4);
    assert_eq!(report.cache_save, Some(summit::cache::SaveOutcome::Skipped));
}
