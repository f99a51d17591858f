//! CLI output: tables and JSON for command results, and error mapping.

use crate::error::EngineError;
use crate::orchestrator::RunReport;
use crate::schedule::Level;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde::Serialize;
use std::path::PathBuf;

/// Map engine errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    match e {
        EngineError::CycleDetected { nodes, .. } => {
            let preview: Vec<&str> = nodes.iter().take(10).map(|n| n.as_str()).collect();
            format!(
                "{}\nNodes involved: {}{}",
                e,
                preview.join(", "),
                if nodes.len() > preview.len() { ", ..." } else { "" }
            )
        }
        _ => e.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub(crate) fn parse(value: &str) -> Result<Self, EngineError> {
        match value {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(EngineError::Config(format!(
                "Invalid output format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::Config(format!("Failed to render JSON: {}", e)))
}

pub(crate) fn format_run_report(report: &RunReport, format: OutputFormat) -> Result<String, EngineError> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Pass", "Nodes", "Levels", "Unchanged", "Restored", "Regenerated", "Failed", "Calls",
    ]);
    for pass in &report.passes {
        let (mut unchanged, mut restored, mut regenerated, mut failed) = (0, 0, 0, 0);
        for level in &pass.levels {
            unchanged += level.unchanged;
            restored += level.restored;
            regenerated += level.regenerated;
            failed += level.failed;
        }
        table.add_row(vec![
            pass.pass_id.to_string(),
            pass.node_count.to_string(),
            pass.levels.len().to_string(),
            unchanged.to_string(),
            restored.to_string(),
            regenerated.to_string(),
            failed.to_string(),
            pass.calls().to_string(),
        ]);
    }

    let mut out = table.to_string();
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        out.push_str("\n\nFailed nodes:\n");
        for failure in failures {
            out.push_str(&format!("  {}: {}\n", failure.node_id, failure.message));
        }
    }
    if let Some(embedding) = &report.embedding {
        out.push_str(&format!(
            "\nEmbeddings: {} written, {} current, {} failed",
            embedding.embedded, embedding.skipped, embedding.failed
        ));
    }
    if report.cancelled {
        out.push_str("\nRun cancelled before all levels completed.");
    }
    out.push_str(&format!(
        "\nTotal generation calls: {} in {} ms",
        report.total_calls(),
        report.duration_ms
    ));
    Ok(out)
}

#[derive(Debug, Serialize)]
struct LevelView<'a> {
    index: usize,
    nodes: Vec<&'a str>,
}

pub(crate) fn format_plan(pass: &str, levels: &[Level], format: OutputFormat) -> Result<String, EngineError> {
    if format == OutputFormat::Json {
        let views: Vec<LevelView<'_>> = levels
            .iter()
            .map(|l| LevelView {
                index: l.index,
                nodes: l.node_ids.iter().map(|n| n.as_str()).collect(),
            })
            .collect();
        return to_json(&serde_json::json!({ "pass": pass, "levels": views }));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Level", "Nodes", "Ids"]);
    for level in levels {
        let ids: Vec<&str> = level.node_ids.iter().map(|n| n.as_str()).collect();
        table.add_row(vec![level.index.to_string(), level.len().to_string(), ids.join("\n")]);
    }
    Ok(format!("Pass {}: {} level(s)\n{}", pass, levels.len(), table))
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CacheStats {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: Option<u64>,
    pub backups: Vec<BackupStat>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BackupStat {
    pub path: PathBuf,
    pub bytes: Option<u64>,
}

pub(crate) fn format_cache_stats(stats: &CacheStats, format: OutputFormat) -> Result<String, EngineError> {
    if format == OutputFormat::Json {
        return to_json(stats);
    }

    let size = |bytes: Option<u64>| bytes.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["File", "Bytes"]);
    table.add_row(vec![stats.path.display().to_string(), size(stats.bytes)]);
    for backup in &stats.backups {
        table.add_row(vec![backup.path.display().to_string(), size(backup.bytes)]);
    }
    Ok(format!("Entries: {}\n{}", stats.entries, table))
}
