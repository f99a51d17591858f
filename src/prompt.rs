//! Renders context payloads into chat messages for model providers.

use crate::generation::{ContextPayload, FoldSection, PayloadMode};
use crate::provider::{ChatMessage, MessageRole};
use crate::types::NodeKind;

fn system_prompt(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::LeafUnit => {
            "You are a senior engineer documenting source code. Describe what the given code unit \
             does, its inputs, outputs and side effects, in a short technical paragraph."
        }
        NodeKind::HierarchicalUnit => {
            "You are a senior engineer documenting a type. Explain its responsibility, how it \
             relates to the types it inherits from, and what its members provide."
        }
        NodeKind::Container => {
            "You are a senior engineer documenting a codebase. Summarize the purpose of the given \
             file or directory from the summaries of its contents."
        }
        NodeKind::Root => {
            "You are a senior engineer writing a project overview. Describe what the project does \
             and how its main parts fit together."
        }
    }
}

fn subject(payload: &ContextPayload) -> String {
    match &payload.name {
        Some(name) => format!("{} '{}'", payload.kind.label(), name),
        None => format!("{} {}", payload.kind.label(), payload.node_id),
    }
}

pub fn render_messages(payload: &ContextPayload) -> Vec<ChatMessage> {
    let user = match payload.mode {
        PayloadMode::Complete => format!(
            "Summarize the {}.\n\n{}",
            subject(payload),
            payload.context
        ),
        PayloadMode::Fold {
            section,
            step,
            total_steps,
        } => {
            let part = match section {
                FoldSection::RawContent => "source".to_string(),
                FoldSection::Category(category) => category.heading().to_lowercase(),
            };
            let running = payload
                .running_result
                .as_deref()
                .unwrap_or("(nothing yet)");
            format!(
                "You are building a summary of the {} incrementally (part {} of {}).\n\n\
                 Summary so far:\n{}\n\n\
                 Next part ({}):\n{}\n\n\
                 Rewrite the summary so it also covers the new part. Reply with the summary only.",
                subject(payload),
                step,
                total_steps,
                running,
                part,
                payload.context
            )
        }
    };

    vec![
        ChatMessage {
            role: MessageRole::System,
            content: system_prompt(payload.kind).to_string(),
        },
        ChatMessage {
            role: MessageRole::User,
            content: user,
        },
    ]
}
