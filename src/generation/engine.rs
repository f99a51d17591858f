//! Decision waterfall and iterative fold for a single node.

use super::payload::{fold_seed, CategorySection, CombinedInput, ContextPayload, FoldSection};
use super::plan::FoldPlan;
use super::retry::RetryPolicy;
use super::GenerationService;
use crate::budget::ContextBudget;
use crate::cache::{RuntimeMark, SummaryCache};
use crate::error::GenerationError;
use crate::graph::ArtifactSink;
use crate::types::{CacheEntry, ContentHash, DependencyCategory, Node, NodeId, NodeStatus};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of processing one node
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub node_id: NodeId,
    pub status: NodeStatus,
    /// Artifact for every status except `Failed`
    pub entry: Option<CacheEntry>,
    /// Generation service invocations, retries included
    pub calls: u32,
    pub error: Option<GenerationError>,
}

impl NodeOutcome {
    fn resolved(node_id: NodeId, status: NodeStatus, entry: CacheEntry, calls: u32) -> Self {
        Self {
            node_id,
            status,
            entry: Some(entry),
            calls,
            error: None,
        }
    }

    pub fn failed(node_id: NodeId, error: GenerationError, calls: u32) -> Self {
        Self {
            node_id,
            status: NodeStatus::Failed,
            entry: None,
            calls,
            error: Some(error),
        }
    }
}

pub struct GenerationEngine {
    service: Arc<dyn GenerationService>,
    budget: ContextBudget,
    retry: RetryPolicy,
    fold_plan: FoldPlan,
}

impl GenerationEngine {
    pub fn new(service: Arc<dyn GenerationService>, budget: ContextBudget) -> Self {
        Self {
            service,
            budget,
            retry: RetryPolicy::default(),
            fold_plan: FoldPlan::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fold_plan(mut self, fold_plan: FoldPlan) -> Self {
        self.fold_plan = fold_plan;
        self
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Decide and, if needed, derive the artifact for `node`.
    ///
    /// An artifact is current when it was derived from the node's present
    /// content hash and from the dependency artifacts that resolve now.
    ///
    /// 1. current persisted artifact and no changed dependency: `Unchanged`
    /// 2. current in-memory cache entry and no changed dependency: `Restored`
    /// 3. otherwise derive it: `Regenerated`, or `Failed` once retries are spent
    ///
    /// A dependency that failed earlier in the run also forces step 3.
    pub async fn process(
        &self,
        node: &Node,
        cache: &SummaryCache,
        sink: &dyn ArtifactSink,
    ) -> NodeOutcome {
        let stale = cache.was_any_dependency_changed(node.dependency_ids())
            || cache.was_any_dependency_failed(node.dependency_ids());
        let resolved = resolve_dependencies(node, cache, sink);
        let fingerprint = ContentHash::of_dependencies(
            resolved.iter().map(|dep| (&dep.id, dep.artifact.as_str())),
        );

        if !stale {
            match sink.read_artifact(&node.id) {
                Ok(Some(stored)) if stored.is_current(&node.content_hash, fingerprint.as_ref()) => {
                    debug!(node_id = %node.id, "Persisted artifact is current");
                    let entry = match cache.get(&node.id) {
                        Some(entry)
                            if entry.is_current(&stored.content_hash, fingerprint.as_ref())
                                && entry.artifact == stored.artifact =>
                        {
                            entry
                        }
                        _ => CacheEntry::new(node.id.clone(), stored.artifact, stored.content_hash)
                            .with_dependency_fingerprint(fingerprint),
                    };
                    return NodeOutcome::resolved(node.id.clone(), NodeStatus::Unchanged, entry, 0);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(node_id = %node.id, error = %e, "Artifact sink read failed, skipping validity check");
                }
            }

            if let Some(entry) = cache.get(&node.id) {
                if entry.is_current(&node.content_hash, fingerprint.as_ref()) {
                    debug!(node_id = %node.id, "Restored artifact from summary cache");
                    return NodeOutcome::resolved(node.id.clone(), NodeStatus::Restored, entry, 0);
                }
            }
        }

        self.regenerate(node, &resolved, fingerprint).await
    }

    async fn regenerate(
        &self,
        node: &Node,
        resolved: &[ResolvedDependency],
        fingerprint: Option<ContentHash>,
    ) -> NodeOutcome {
        let started = Instant::now();
        let input = self.combined_input(node, resolved);
        if input.is_empty() {
            warn!(node_id = %node.id, "No raw content or dependency artifacts available");
            return NodeOutcome::failed(
                node.id.clone(),
                GenerationError::Fatal("no input available for generation".to_string()),
                0,
            );
        }

        let calls = AtomicU32::new(0);
        let result = self.derive(node, &input, &calls).await;
        let calls = calls.into_inner();

        match result {
            Ok(artifact) => {
                info!(
                    node_id = %node.id,
                    kind = %node.kind,
                    calls,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Regenerated artifact"
                );
                let entry = CacheEntry::new(node.id.clone(), artifact, node.content_hash.clone())
                    .with_dependency_fingerprint(fingerprint);
                NodeOutcome::resolved(node.id.clone(), NodeStatus::Regenerated, entry, calls)
            }
            Err(error) => {
                warn!(node_id = %node.id, calls, error = %error, "Generation failed");
                NodeOutcome::failed(node.id.clone(), error, calls)
            }
        }
    }

    /// Raw content plus resolved dependency artifacts, sectioned in fold order.
    fn combined_input(&self, node: &Node, resolved: &[ResolvedDependency]) -> CombinedInput {
        let mut sections = Vec::new();
        for category in self.fold_plan.order_for(node.kind) {
            let artifacts: Vec<String> = resolved
                .iter()
                .filter(|dep| dep.category == category)
                .map(|dep| dep.artifact.clone())
                .collect();
            if !artifacts.is_empty() {
                sections.push(CategorySection {
                    category,
                    artifacts,
                });
            }
        }

        CombinedInput {
            raw_content: node.raw_content.clone(),
            sections,
        }
    }

    async fn derive(
        &self,
        node: &Node,
        input: &CombinedInput,
        calls: &AtomicU32,
    ) -> Result<String, GenerationError> {
        let rendered = input.render();
        if self.budget.fits(&rendered) {
            let payload = ContextPayload::complete(node, rendered);
            return self.call(&payload, calls).await;
        }

        let steps = self.fold_steps(input);
        let total_steps = steps.len();
        debug!(
            node_id = %node.id,
            size = self.budget.size(&rendered),
            max_units = self.budget.max_units(),
            total_steps,
            "Input exceeds budget, folding"
        );

        let mut running = fold_seed(node);
        for (index, (section, chunk)) in steps.into_iter().enumerate() {
            let payload =
                ContextPayload::fold_step(node, section, index + 1, total_steps, running.take(), chunk);
            running = Some(self.call(&payload, calls).await?);
        }

        running.ok_or_else(|| GenerationError::Fatal("fold produced no result".to_string()))
    }

    /// Chunks in fold order: raw content windows first, then each category's
    /// artifact groups. Categories never interleave.
    fn fold_steps(&self, input: &CombinedInput) -> Vec<(FoldSection, String)> {
        let chunk_units = self.budget.chunk_units();
        let mut steps = Vec::new();

        if let Some(raw) = input.raw_content.as_deref() {
            for window in self
                .budget
                .chunk_contiguous(raw, chunk_units, self.budget.overlap_units())
            {
                steps.push((FoldSection::RawContent, window));
            }
        }

        for section in &input.sections {
            for group in self.budget.group_discrete(&section.artifacts, chunk_units) {
                steps.push((FoldSection::Category(section.category), group.render()));
            }
        }

        steps
    }

    async fn call(
        &self,
        payload: &ContextPayload,
        calls: &AtomicU32,
    ) -> Result<String, GenerationError> {
        let service = &self.service;
        self.retry
            .run(payload.node_id.as_str(), move || {
                calls.fetch_add(1, Ordering::Relaxed);
                service.generate(payload)
            })
            .await
    }
}

/// A dependency artifact available to the node being processed
#[derive(Debug)]
struct ResolvedDependency {
    id: NodeId,
    category: DependencyCategory,
    artifact: String,
}

/// Current artifacts of `node`'s dependencies in edge order. Repeated edges
/// to the same id keep the first category.
fn resolve_dependencies(
    node: &Node,
    cache: &SummaryCache,
    sink: &dyn ArtifactSink,
) -> Vec<ResolvedDependency> {
    let mut seen = HashSet::new();
    node.dependencies
        .iter()
        .filter(|dep| seen.insert(&dep.id))
        .filter_map(|dep| {
            resolve_artifact(&dep.id, cache, sink).map(|artifact| ResolvedDependency {
                id: dep.id.clone(),
                category: dep.category,
                artifact,
            })
        })
        .collect()
}

/// Current artifact of a dependency. Dependencies that failed in this run are
/// skipped; their cached text is stale.
fn resolve_artifact(id: &NodeId, cache: &SummaryCache, sink: &dyn ArtifactSink) -> Option<String> {
    if cache.runtime().mark(id) == Some(RuntimeMark::Failed) {
        debug!(dependency = %id, "Dependency failed this run, omitted from context");
        return None;
    }
    if let Some(entry) = cache.get(id) {
        return Some(entry.artifact);
    }
    match sink.read_artifact(id) {
        Ok(stored) => stored.map(|s| s.artifact),
        Err(e) => {
            warn!(dependency = %id, error = %e, "Could not read dependency artifact");
            None
        }
    }
}
