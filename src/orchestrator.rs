//! Orchestrator: runs the configured passes in sequence over their scoped
//! subgraphs, then the embedding stage, and always saves the summary cache.

use crate::cache::{SaveOutcome, SummaryCache};
use crate::embedding::{EmbeddingReport, EmbeddingStage};
use crate::error::{CacheError, EngineError};
use crate::executor::{BatchExecutor, LevelReport, NodeFailure};
use crate::generation::{GenerationEngine, RetryPolicy};
use crate::graph::{ArtifactSink, GraphProvider};
use crate::types::{Node, NodeId, NodeStatus, PassId};
use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod pass;

pub use pass::{default_passes, LevelOrdering, PassSpec};

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: PassId,
    pub node_count: usize,
    pub levels: Vec<LevelReport>,
}

impl PassReport {
    pub fn calls(&self) -> u64 {
        self.levels.iter().map(|l| l.calls).sum()
    }
}

/// Status counts across a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub unchanged: usize,
    pub restored: usize,
    pub regenerated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub passes: Vec<PassReport>,
    pub embedding: Option<EmbeddingReport>,
    /// The run stopped at a level boundary on request
    pub cancelled: bool,
    pub cache_save: Option<SaveOutcome>,
    pub duration_ms: u64,
}

impl RunReport {
    /// Latest status recorded for `id` in this run.
    pub fn status_of(&self, id: &NodeId) -> Option<NodeStatus> {
        self.passes
            .iter()
            .rev()
            .flat_map(|p| p.levels.iter().rev())
            .find_map(|l| l.statuses.get(id).copied())
    }

    pub fn total_calls(&self) -> u64 {
        self.passes.iter().map(PassReport::calls).sum()
    }

    pub fn totals(&self) -> StatusTotals {
        let mut totals = StatusTotals::default();
        for level in self.passes.iter().flat_map(|p| &p.levels) {
            totals.unchanged += level.unchanged;
            totals.restored += level.restored;
            totals.regenerated += level.regenerated;
            totals.failed += level.failed;
        }
        totals
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeFailure> {
        self.passes
            .iter()
            .flat_map(|p| &p.levels)
            .flat_map(|l| &l.failures)
    }
}

pub struct Orchestrator {
    graph: Arc<dyn GraphProvider>,
    sink: Arc<dyn ArtifactSink>,
    cache: Arc<SummaryCache>,
    executor: BatchExecutor,
    passes: Vec<PassSpec>,
    embedding: Option<EmbeddingStage>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<dyn GraphProvider>,
        sink: Arc<dyn ArtifactSink>,
        cache: Arc<SummaryCache>,
        engine: Arc<GenerationEngine>,
        workers: usize,
    ) -> Self {
        let executor = BatchExecutor::new(engine, Arc::clone(&cache), Arc::clone(&sink), workers);
        Self {
            graph,
            sink,
            cache,
            executor,
            passes: default_passes(),
            embedding: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_passes(mut self, passes: Vec<PassSpec>) -> Self {
        self.passes = passes;
        self
    }

    pub fn with_embedding(mut self, stage: EmbeddingStage) -> Self {
        self.embedding = Some(stage);
        self
    }

    pub fn with_write_retry(mut self, retry: RetryPolicy) -> Self {
        self.executor = self.executor.with_write_retry(retry);
        self
    }

    pub fn passes(&self) -> &[PassSpec] {
        &self.passes
    }

    /// Cancelling stops the run at the next level boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every pass, then the embedding stage.
    ///
    /// The summary cache is saved whether or not the passes succeed, and
    /// before a panic from a collaborator is propagated. A pass error is
    /// returned after the save.
    pub async fn run(&self) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        self.cache.begin_run();

        let mut report = RunReport::default();
        let outcome = match AssertUnwindSafe(self.run_passes(&mut report))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!("Pass loop panicked, saving summary cache before unwinding");
                if let Err(e) = self.cache.save() {
                    error!(error = %e, "Summary cache save failed");
                }
                std::panic::resume_unwind(panic);
            }
        };

        if outcome.is_ok() && !report.cancelled {
            if let Some(stage) = &self.embedding {
                let candidates = self.embedding_candidates(&report);
                report.embedding = Some(stage.run(candidates, self.sink.as_ref()).await);
            }
        }

        let saved = self.cache.save();
        report.duration_ms = started.elapsed().as_millis() as u64;

        let saved = match saved {
            Ok(save) => {
                if let SaveOutcome::Rejected {
                    new_bytes,
                    previous_bytes,
                } = save
                {
                    warn!(new_bytes, previous_bytes, "Summary cache promotion rejected");
                }
                report.cache_save = Some(save);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Summary cache save failed");
                Err(e)
            }
        };

        outcome?;
        saved.map_err(|e| match e {
            CacheError::PersistenceWriteFailure { attempts, message } => {
                EngineError::PersistenceWriteFailure { attempts, message }
            }
            other => EngineError::Cache(other),
        })?;

        let totals = report.totals();
        info!(
            passes = report.passes.len(),
            unchanged = totals.unchanged,
            restored = totals.restored,
            regenerated = totals.regenerated,
            failed = totals.failed,
            calls = report.total_calls(),
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "Run complete"
        );
        Ok(report)
    }

    async fn run_passes(&self, report: &mut RunReport) -> Result<(), EngineError> {
        for pass in &self.passes {
            let nodes = self.graph.list_scoped_nodes(&pass.id)?;
            let levels = match pass.schedule(&nodes) {
                Ok(levels) => levels,
                Err(e) => {
                    error!(pass = %pass.id, error = %e, "Pass cannot be scheduled");
                    return Err(e);
                }
            };

            let node_count = nodes.len();
            let by_id: HashMap<NodeId, Node> =
                nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
            info!(pass = %pass.id, nodes = node_count, levels = levels.len(), "Pass started");

            let mut pass_report = PassReport {
                pass_id: pass.id.clone(),
                node_count,
                levels: Vec::with_capacity(levels.len()),
            };

            for level in &levels {
                if self.cancel.is_cancelled() {
                    warn!(pass = %pass.id, level = level.index, "Run cancelled");
                    report.cancelled = true;
                    break;
                }
                let result = self.executor.execute_level(level, &by_id).await;
                match result {
                    Ok(level_report) => pass_report.levels.push(level_report),
                    Err(e) => {
                        report.passes.push(pass_report);
                        return Err(e);
                    }
                }
            }

            info!(
                pass = %pass.id,
                calls = pass_report.calls(),
                "Pass complete"
            );
            report.passes.push(pass_report);

            if report.cancelled {
                break;
            }
        }
        Ok(())
    }

    /// Non-failed nodes of this run that have an artifact in the cache.
    fn embedding_candidates(&self, report: &RunReport) -> Vec<(NodeId, String)> {
        let mut latest: BTreeMap<&NodeId, NodeStatus> = BTreeMap::new();
        for level in report.passes.iter().flat_map(|p| &p.levels) {
            for (id, status) in &level.statuses {
                latest.insert(id, *status);
            }
        }

        latest
            .into_iter()
            .filter(|(_, status)| *status != NodeStatus::Failed)
            .filter_map(|(id, _)| {
                self.cache
                    .get(id)
                    .map(|entry| (id.clone(), entry.artifact))
            })
            .collect()
    }
}
