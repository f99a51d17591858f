//! Generation Engine
//!
//! Per-node decision waterfall (validity check, cache restoration,
//! regeneration) and the iterative fold used when a node's input exceeds the
//! context budget.

use crate::error::GenerationError;
use async_trait::async_trait;

pub mod engine;
pub mod payload;
pub mod plan;
pub mod retry;

pub use engine::{GenerationEngine, NodeOutcome};
pub use payload::{CategorySection, CombinedInput, ContextPayload, FoldSection, PayloadMode};
pub use plan::FoldPlan;
pub use retry::RetryPolicy;

/// External text generation backend
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, payload: &ContextPayload) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}
