//! CLI parse: clap types for Summit. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Summit CLI - incremental hierarchical summaries for code graphs
#[derive(Parser, Debug)]
#[command(name = "summit", version)]
#[command(about = "Incrementally derive summaries from leaf code units up to the project root")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file layered after the workspace summit.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Graph snapshot (default: <workspace>/.summit/graph.json)
    #[arg(long)]
    pub graph: Option<PathBuf>,

    /// Artifact store (default: <workspace>/.summit/artifacts.json)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every configured pass, then the embedding stage
    Run {
        /// Generation backend (openai, deepseek, ollama, fake)
        #[arg(long)]
        provider: Option<String>,
        /// Model name for the generation backend
        #[arg(long)]
        model: Option<String>,
        /// Worker pool size per level
        #[arg(long)]
        workers: Option<usize>,
        /// Skip the embedding stage
        #[arg(long)]
        no_embed: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the level schedule of one pass
    Plan {
        /// Pass id
        pass: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Summary cache commands
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Entries, size and backups of the summary cache
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
