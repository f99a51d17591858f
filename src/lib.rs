//! Summit: Incremental Hierarchical Derivation
//!
//! Derives text artifacts for every node of a code graph, from leaf units up
//! to the project root. Artifacts are regenerated only when a node's content
//! or one of its dependencies changed, levels run in parallel on a bounded
//! pool, and oversized inputs are folded chunk by chunk within a context
//! budget.

pub mod budget;
pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod executor;
pub mod generation;
pub mod graph;
pub mod logging;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod schedule;
pub mod types;

pub use cache::SummaryCache;
pub use error::{EngineError, GenerationError};
pub use generation::{GenerationEngine, GenerationService};
pub use orchestrator::{Orchestrator, RunReport};
