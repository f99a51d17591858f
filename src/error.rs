//! Error types for the derivation engine.

use crate::types::{NodeId, PassId};
use thiserror::Error;

/// Failure of a single generation or embedding call
///
/// Transient failures are retried at the call site; fatal ones fail the node
/// immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Transient generation error: {0}")]
    Transient(String),

    #[error("Fatal generation error: {0}")]
    Fatal(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

/// Errors raised by model provider clients
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Provider model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Provider request timeout: {0}")]
    Timeout(String),

    #[error("Provider connection error: {0}")]
    Connection(String),

    #[error("Provider returned a malformed response: {0}")]
    Malformed(String),

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Rate limits, server-side failures and network trouble are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimit(_)
            | ProviderError::Timeout(_)
            | ProviderError::Connection(_) => true,
            ProviderError::RequestFailed { status, .. } => *status >= 500 || *status == 408,
            _ => false,
        }
    }
}

impl From<ProviderError> for GenerationError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            GenerationError::Transient(err.to_string())
        } else {
            GenerationError::Fatal(err.to_string())
        }
    }
}

/// Summary cache persistence errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache file is corrupt: {0}")]
    Corrupt(String),

    #[error("Cache write failed after {attempts} attempts: {message}")]
    PersistenceWriteFailure { attempts: u32, message: String },
}

/// Artifact sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Artifact sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Artifact sink error: {0}")]
    Backend(String),
}

/// Graph provider errors
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Graph snapshot is invalid: {0}")]
    Invalid(String),
}

/// Errors of the depth-ordered scheduling specialization
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Node {0} has no depth but the pass is depth-ordered")]
    MissingDepth(NodeId),

    #[error("Depth is not monotonic: {node} depends on {dependency} which is not deeper")]
    NonMonotonicDepth { node: NodeId, dependency: NodeId },
}

/// Run-level fatal errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Dependency cycle in pass {pass}: {} node(s) could not be ordered", nodes.len())]
    CycleDetected { pass: PassId, nodes: Vec<NodeId> },

    #[error("Scheduling failed in pass {pass}: {source}")]
    Schedule {
        pass: PassId,
        #[source]
        source: ScheduleError,
    },

    #[error("Graph provider error: {0}")]
    Graph(#[from] GraphError),

    #[error("Artifact write failed after {attempts} attempts: {message}")]
    PersistenceWriteFailure { attempts: u32, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Artifact sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
