//! CLI route: one handler per command, dispatched from [`RunContext::execute`].

use super::output::{
    format_cache_stats, format_plan, format_run_report, BackupStat, CacheStats, OutputFormat,
};
use super::parse::{CacheCommands, Commands};
use crate::budget::ContextBudget;
use crate::cache::{backup_path, SummaryCache};
use crate::config::SummitConfig;
use crate::embedding::EmbeddingStage;
use crate::error::EngineError;
use crate::generation::GenerationEngine;
use crate::graph::{ArtifactStore, GraphProvider, GraphSnapshot};
use crate::orchestrator::Orchestrator;
use crate::provider::{ProviderGenerationService, ProviderType};
use crate::types::PassId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved workspace, configuration and file locations for one invocation
pub struct RunContext {
    workspace: PathBuf,
    config: SummitConfig,
    graph_path: PathBuf,
    store_path: PathBuf,
}

impl RunContext {
    pub fn new(
        workspace: PathBuf,
        mut config: SummitConfig,
        graph_path: Option<PathBuf>,
        store_path: Option<PathBuf>,
    ) -> Self {
        config.resolve_paths(&workspace);
        let graph_path = graph_path.unwrap_or_else(|| workspace.join(".summit").join("graph.json"));
        let store_path =
            store_path.unwrap_or_else(|| workspace.join(".summit").join("artifacts.json"));
        Self {
            workspace,
            config,
            graph_path,
            store_path,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &SummitConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, EngineError> {
        match command {
            Commands::Run {
                provider,
                model,
                workers,
                no_embed,
                format,
            } => {
                self.handle_run(
                    provider.as_deref(),
                    model.as_deref(),
                    *workers,
                    *no_embed,
                    OutputFormat::parse(format)?,
                )
                .await
            }
            Commands::Plan { pass, format } => self.handle_plan(pass, OutputFormat::parse(format)?),
            Commands::Cache {
                command: CacheCommands::Stats { format },
            } => self.handle_cache_stats(OutputFormat::parse(format)?),
        }
    }

    fn load_graph(&self) -> Result<GraphSnapshot, EngineError> {
        let snapshot = GraphSnapshot::from_file(&self.graph_path)?;
        info!(
            path = %self.graph_path.display(),
            nodes = snapshot.node_count(),
            "Graph snapshot loaded"
        );
        Ok(snapshot)
    }

    async fn handle_run(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        workers: Option<usize>,
        no_embed: bool,
        format: OutputFormat,
    ) -> Result<String, EngineError> {
        let mut config = self.config.clone();
        if let Some(name) = provider {
            config.provider.provider_type = ProviderType::parse(name).ok_or_else(|| {
                EngineError::Config(format!("Unknown provider: {}", name))
            })?;
        }
        if let Some(model) = model {
            config.provider.model = model.to_string();
        }
        if let Some(workers) = workers {
            config.engine.workers = workers;
        }
        if config.engine.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".to_string()));
        }
        config
            .provider
            .validate()
            .map_err(|e| EngineError::Config(format!("Provider: {}", e)))?;

        let service = Arc::new(ProviderGenerationService::from_config(&config.provider)?);
        let engine = GenerationEngine::new(service, ContextBudget::from_config(&config.engine.budget))
            .with_retry(config.engine.retry.clone())
            .with_fold_plan(config.engine.fold_order.clone());

        let graph = Arc::new(self.load_graph()?);
        let sink = Arc::new(ArtifactStore::open(&self.store_path)?);
        let cache = Arc::new(SummaryCache::load(config.cache.clone()));

        let mut orchestrator =
            Orchestrator::new(graph, sink, cache, Arc::new(engine), config.engine.workers)
                .with_passes(config.passes.clone())
                .with_write_retry(config.engine.retry.clone());

        if config.embedding.enabled && !no_embed {
            let embedder = config.embedding.build_service()?;
            orchestrator = orchestrator.with_embedding(
                EmbeddingStage::new(embedder, config.embedding.batch_size)
                    .with_retry(config.engine.retry.clone()),
            );
        }

        let token = orchestrator.cancellation_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current level");
                token.cancel();
            }
        });
        let result = orchestrator.run().await;
        interrupt.abort();

        format_run_report(&result?, format)
    }

    fn handle_plan(&self, pass: &str, format: OutputFormat) -> Result<String, EngineError> {
        let pass_id = PassId::from(pass);
        let spec = self
            .config
            .passes
            .iter()
            .find(|p| p.id == pass_id)
            .ok_or_else(|| EngineError::Config(format!("Pass '{}' is not configured", pass)))?;

        let graph = self.load_graph()?;
        let nodes = graph.list_scoped_nodes(&spec.id)?;
        let levels = spec.schedule(&nodes)?;
        format_plan(pass, &levels, format)
    }

    fn handle_cache_stats(&self, format: OutputFormat) -> Result<String, EngineError> {
        let cache_config = &self.config.cache;
        let cache = SummaryCache::load(cache_config.clone());
        let size = |path: &Path| std::fs::metadata(path).ok().map(|m| m.len());

        let stats = CacheStats {
            path: cache_config.path.clone(),
            entries: cache.len(),
            bytes: size(&cache_config.path),
            backups: (1..=cache_config.backups)
                .map(|generation| {
                    let path = backup_path(&cache_config.path, generation);
                    BackupStat {
                        bytes: size(&path),
                        path,
                    }
                })
                .collect(),
        };
        format_cache_stats(&stats, format)
    }
}
