//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file, the workspace
//! `summit.toml` (or an explicit `--config` file), then `SUMMIT__*`
//! environment variables. CLI flags are applied by the caller on the loaded
//! value.

use crate::budget::BudgetConfig;
use crate::cache::CacheConfig;
use crate::embedding::EmbeddingConfig;
use crate::error::EngineError;
use crate::generation::{FoldPlan, RetryPolicy};
use crate::logging::LoggingConfig;
use crate::orchestrator::{default_passes, PassSpec};
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

mod merge {
    pub(super) mod merge_policy;
}
mod sources {
    pub(super) mod environment;
    pub(super) mod global_file;
    pub(super) mod workspace_file;
}

pub use sources::global_file::global_config_path;
pub use sources::workspace_file::{workspace_config_path, WORKSPACE_CONFIG_FILE};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummitConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Generation backend
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Passes in execution order
    #[serde(default = "default_passes")]
    pub passes: Vec<PassSpec>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SummitConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
            embedding: EmbeddingConfig::default(),
            passes: default_passes(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size per level
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Fold category order per node kind
    #[serde(default)]
    pub fold_order: FoldPlan,
}

fn default_workers() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            budget: BudgetConfig::default(),
            retry: RetryPolicy::default(),
            fold_order: FoldPlan::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Engine(String),
    Cache(String),
    Provider(String),
    Embedding(String),
    Passes(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Engine(msg) => write!(f, "Engine: {}", msg),
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Embedding(msg) => write!(f, "Embedding: {}", msg),
            ValidationError::Passes(msg) => write!(f, "Passes: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.workers == 0 {
            errors.push("workers must be at least 1".to_string());
        }
        if let Err(e) = self.budget.validate() {
            errors.push(e);
        }
        if let Err(e) = self.retry.validate() {
            errors.push(e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl SummitConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(engine_errors) = self.engine.validate() {
            errors.extend(engine_errors.into_iter().map(ValidationError::Engine));
        }
        if let Err(e) = self.cache.validate() {
            errors.push(ValidationError::Cache(e));
        }
        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if self.embedding.enabled {
            if let Err(e) = self.embedding.validate() {
                errors.push(ValidationError::Embedding(e));
            }
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if self.passes.is_empty() {
            errors.push(ValidationError::Passes("at least one pass is required".to_string()));
        }
        let mut seen = HashSet::new();
        for pass in &self.passes {
            if !seen.insert(&pass.id) {
                errors.push(ValidationError::Passes(format!(
                    "Duplicate pass id '{}'",
                    pass.id
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Anchor relative file paths at `workspace_root`.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        if self.cache.path.is_relative() {
            self.cache.path = workspace_root.join(&self.cache.path);
        }
        if self.logging.file.is_relative() {
            self.logging.file = workspace_root.join(&self.logging.file);
        }
    }
}

/// Loads [`SummitConfig`] from its layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// `explicit` replaces nothing; it is layered after the workspace file.
    pub fn load(workspace_root: &Path, explicit: Option<&Path>) -> Result<SummitConfig, EngineError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root, explicit)?;
        let builder = sources::environment::add_to_builder(builder);

        let config: SummitConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load and validate, joining validation messages into one error.
    pub fn load_validated(
        workspace_root: &Path,
        explicit: Option<&Path>,
    ) -> Result<SummitConfig, EngineError> {
        let config = Self::load(workspace_root, explicit)?;
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            EngineError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}
