//! Context payloads handed to the generation service.

use crate::budget::DISCRETE_SEPARATOR;
use crate::types::{DependencyCategory, Node, NodeId, NodeKind};
use serde::Serialize;

/// Part of the combined input a fold step consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldSection {
    RawContent,
    Category(DependencyCategory),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PayloadMode {
    /// The whole input fits in one call
    Complete,
    /// One step of an iterative fold; `step` is 1-based
    Fold {
        section: FoldSection,
        step: usize,
        total_steps: usize,
    },
}

/// Everything one generation call sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPayload {
    pub node_id: NodeId,
    pub kind: NodeKind,
    pub name: Option<String>,
    pub mode: PayloadMode,
    /// Result of the previous fold step, or the seed
    pub running_result: Option<String>,
    pub context: String,
}

impl ContextPayload {
    pub fn complete(node: &Node, context: String) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            mode: PayloadMode::Complete,
            running_result: None,
            context,
        }
    }

    pub fn fold_step(
        node: &Node,
        section: FoldSection,
        step: usize,
        total_steps: usize,
        running_result: Option<String>,
        context: String,
    ) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind,
            name: node.name.clone(),
            mode: PayloadMode::Fold {
                section,
                step,
                total_steps,
            },
            running_result,
            context,
        }
    }

    pub fn is_fold(&self) -> bool {
        matches!(self.mode, PayloadMode::Fold { .. })
    }
}

/// Artifacts of one dependency category, in dependency order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySection {
    pub category: DependencyCategory,
    pub artifacts: Vec<String>,
}

/// Raw content plus dependency artifacts grouped by category in fold order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedInput {
    pub raw_content: Option<String>,
    pub sections: Vec<CategorySection>,
}

impl CombinedInput {
    pub fn is_empty(&self) -> bool {
        self.raw_content.as_deref().map_or(true, str::is_empty) && self.sections.is_empty()
    }

    pub fn artifact_count(&self) -> usize {
        self.sections.iter().map(|s| s.artifacts.len()).sum()
    }

    /// Single-call rendering. Raw content comes first and is left bare when
    /// it is the only input; each category gets a heading.
    pub fn render(&self) -> String {
        let raw = self.raw_content.as_deref().filter(|r| !r.is_empty());
        if self.sections.is_empty() {
            return raw.unwrap_or_default().to_string();
        }

        let mut parts = Vec::with_capacity(self.sections.len() + 1);
        if let Some(raw) = raw {
            parts.push(format!("Source:\n{}", raw));
        }
        for section in &self.sections {
            parts.push(format!(
                "{}:\n{}",
                section.category.heading(),
                section.artifacts.join(DISCRETE_SEPARATOR)
            ));
        }
        parts.join("\n\n")
    }
}

/// Starting point of a fold for a named node.
pub fn fold_seed(node: &Node) -> Option<String> {
    node.name.as_ref().map(|name| {
        format!(
            "A {} named '{}' whose purpose is defined by its contents.",
            node.kind.label(),
            name
        )
    })
}
