//! Batch executor: runs one level through the generation engine on a bounded
//! worker pool, then commits the level's results in a single batch.
//!
//! A level is a barrier. Every node's outcome is final (and its runtime mark
//! recorded) before the commit, and the commit happens before the caller may
//! start the next level.

use crate::cache::SummaryCache;
use crate::error::{EngineError, GenerationError};
use crate::generation::{GenerationEngine, NodeOutcome, RetryPolicy};
use crate::graph::ArtifactSink;
use crate::schedule::Level;
use crate::types::{ArtifactRecord, CacheEntry, Node, NodeId, NodeStatus};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Node that could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub message: String,
}

/// Per-level counters and outcomes
#[derive(Debug, Clone, Default, Serialize)]
pub struct LevelReport {
    pub level_index: usize,
    pub total: usize,
    pub unchanged: usize,
    pub restored: usize,
    pub regenerated: usize,
    pub failed: usize,
    pub calls: u64,
    pub statuses: BTreeMap<NodeId, NodeStatus>,
    pub failures: Vec<NodeFailure>,
}

impl LevelReport {
    fn record(&mut self, outcome: &NodeOutcome) {
        self.calls += outcome.calls as u64;
        match outcome.status {
            NodeStatus::Unchanged => self.unchanged += 1,
            NodeStatus::Restored => self.restored += 1,
            NodeStatus::Regenerated => self.regenerated += 1,
            NodeStatus::Failed => {
                self.failed += 1;
                self.failures.push(NodeFailure {
                    node_id: outcome.node_id.clone(),
                    message: outcome
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default(),
                });
            }
        }
        self.statuses.insert(outcome.node_id.clone(), outcome.status);
    }
}

pub struct BatchExecutor {
    engine: Arc<GenerationEngine>,
    cache: Arc<SummaryCache>,
    sink: Arc<dyn ArtifactSink>,
    workers: usize,
    write_retry: RetryPolicy,
}

impl BatchExecutor {
    pub fn new(
        engine: Arc<GenerationEngine>,
        cache: Arc<SummaryCache>,
        sink: Arc<dyn ArtifactSink>,
        workers: usize,
    ) -> Self {
        Self {
            engine,
            cache,
            sink,
            workers: workers.max(1),
            write_retry: RetryPolicy {
                call_timeout_ms: None,
                ..RetryPolicy::default()
            },
        }
    }

    /// Retry policy for sink writes
    pub fn with_write_retry(mut self, write_retry: RetryPolicy) -> Self {
        self.write_retry = write_retry;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every node of `level`, wait for all of them, then commit.
    ///
    /// Per-node failures are recorded in the report and do not affect
    /// siblings. An error is returned only when the commit itself fails, in
    /// which case nothing from this level reached the summary cache.
    pub async fn execute_level(
        &self,
        level: &Level,
        nodes: &HashMap<NodeId, Node>,
    ) -> Result<LevelReport, EngineError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut futures = FuturesUnordered::new();

        for id in &level.node_ids {
            let Some(node) = nodes.get(id).cloned() else {
                warn!(node_id = %id, "Scheduled node missing from scope");
                continue;
            };
            let engine = Arc::clone(&self.engine);
            let cache = Arc::clone(&self.cache);
            let sink = Arc::clone(&self.sink);
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                engine.process(&node, &cache, sink.as_ref()).await
            });
            let id = id.clone();
            futures.push(async move { (id, handle.await) });
        }

        let mut report = LevelReport {
            level_index: level.index,
            total: level.len(),
            ..LevelReport::default()
        };
        let mut outcomes = Vec::with_capacity(level.len());

        while let Some((id, joined)) = futures.next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!(node_id = %id, error = %e, "Worker task aborted");
                NodeOutcome::failed(
                    id,
                    GenerationError::Fatal(format!("worker task aborted: {}", e)),
                    0,
                )
            });

            match outcome.status {
                NodeStatus::Regenerated => self.cache.set_runtime_changed(&outcome.node_id),
                NodeStatus::Failed => self.cache.set_runtime_failed(&outcome.node_id),
                NodeStatus::Unchanged | NodeStatus::Restored => {}
            }
            report.record(&outcome);
            outcomes.push(outcome);
        }

        self.commit(&outcomes).await?;

        info!(
            level = report.level_index,
            total = report.total,
            unchanged = report.unchanged,
            restored = report.restored,
            regenerated = report.regenerated,
            failed = report.failed,
            calls = report.calls,
            "Level complete"
        );
        Ok(report)
    }

    /// One bulk write of restored and regenerated artifacts to the sink, then
    /// the same entries (plus refreshed unchanged ones) into the cache.
    async fn commit(&self, outcomes: &[NodeOutcome]) -> Result<(), EngineError> {
        let records: Vec<ArtifactRecord> = outcomes
            .iter()
            .filter(|o| o.status.needs_persist())
            .filter_map(|o| o.entry.as_ref().map(CacheEntry::to_record))
            .collect();

        self.write_artifacts(&records).await?;

        let entries: Vec<CacheEntry> = outcomes
            .iter()
            .filter_map(|o| {
                let entry = o.entry.as_ref()?;
                match o.status {
                    NodeStatus::Restored | NodeStatus::Regenerated => Some(entry.clone()),
                    NodeStatus::Unchanged => match self.cache.get(&o.node_id) {
                        Some(current) if current == *entry => None,
                        _ => Some(entry.clone()),
                    },
                    NodeStatus::Failed => None,
                }
            })
            .collect();
        self.cache.put_many(entries);
        Ok(())
    }

    async fn write_artifacts(&self, records: &[ArtifactRecord]) -> Result<(), EngineError> {
        if records.is_empty() {
            return Ok(());
        }

        let attempts = self.write_retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.write_artifacts(records) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    let delay = self.write_retry.backoff_for(attempt - 1);
                    warn!(attempt, records = records.len(), error = %e, "Artifact write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, records = records.len(), error = %e, "Artifact write failed");
                    return Err(EngineError::PersistenceWriteFailure {
                        attempts,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
