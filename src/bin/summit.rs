//! Summit CLI Binary
//!
//! Command-line interface for incremental hierarchical summary derivation.

use anyhow::Context;
use clap::Parser;
use std::process;
use summit::cli::{Cli, RunContext};
use summit::config::ConfigLoader;
use summit::logging::init_logging;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("Workspace {} is not accessible", cli.workspace.display()))?;
    let mut config = ConfigLoader::load_validated(&workspace, cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!(summit::cli::map_error(&e)))?;

    // CLI flags take priority over files and SUMMIT__ variables
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.resolve_paths(&workspace);
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!(workspace = %workspace.display(), "Summit CLI starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let context = RunContext::new(workspace, config, cli.graph.clone(), cli.store.clone());
    match runtime.block_on(context.execute(&cli.command)) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(anyhow::anyhow!(summit::cli::map_error(&e)))
        }
    }
}
