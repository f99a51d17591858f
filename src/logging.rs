//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come
//! from the configuration file and can be overridden with `SUMMIT_LOG`,
//! `SUMMIT_LOG_FORMAT`, `SUMMIT_LOG_OUTPUT` and `SUMMIT_LOG_MODULES`.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format only, stdout/stderr only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

// Command results go to stdout
fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from(".summit/summit.log")
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !["trace", "debug", "info", "warn", "error", "off"].contains(&self.level.as_str()) {
            return Err(format!("Invalid log level: {}", self.level));
        }
        parse_format(&self.format).map_err(|e| e.to_string())?;
        parse_output(&self.output).map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogOutput {
    Stdout,
    Stderr,
    File,
}

/// Initialize the global subscriber
///
/// Priority order (highest to lowest):
/// 1. Environment variables (SUMMIT_LOG, SUMMIT_LOG_FORMAT, ...)
/// 2. CLI flags, already folded into `config`
/// 3. Configuration files
/// 4. Defaults
pub fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let writer = match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File => {
            if let Some(parent) = config.file.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        EngineError::Config(format!("Failed to create log directory: {}", e))
                    })?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file)
                .map_err(|e| {
                    EngineError::Config(format!(
                        "Failed to open log file {}: {}",
                        config.file.display(),
                        e
                    ))
                })?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    };
    let use_color = config.color && output != LogOutput::File;

    let base_subscriber = Registry::default().with(filter);
    let result = match format {
        LogFormat::Json => base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init(),
    };

    result.map_err(|e| EngineError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, EngineError> {
    if let Ok(filter) = EnvFilter::try_from_env("SUMMIT_LOG") {
        return Ok(filter);
    }

    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    let mut directives: Vec<String> = config
        .modules
        .iter()
        .map(|(module, level)| format!("{}={}", module, level))
        .collect();

    if let Ok(modules) = std::env::var("SUMMIT_LOG_MODULES") {
        directives.extend(parse_module_directives(&modules));
    }

    for directive in directives {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| EngineError::Config(format!("Invalid log directive {}: {}", directive, e)))?,
        );
    }
    Ok(filter)
}

/// `module=level` pairs separated by commas; malformed pairs are ignored.
fn parse_module_directives(spec: &str) -> Vec<String> {
    spec.split(',')
        .filter_map(|pair| {
            let (module, level) = pair.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            if module.is_empty() || level.is_empty() {
                return None;
            }
            Some(format!("{}={}", module, level))
        })
        .collect()
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, EngineError> {
    if let Ok(format) = std::env::var("SUMMIT_LOG_FORMAT") {
        if let Ok(format) = parse_format(&format) {
            return Ok(format);
        }
    }
    parse_format(&config.format)
}

fn parse_format(format: &str) -> Result<LogFormat, EngineError> {
    match format {
        "json" => Ok(LogFormat::Json),
        "text" => Ok(LogFormat::Text),
        other => Err(EngineError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}

fn determine_output(config: &LoggingConfig) -> Result<LogOutput, EngineError> {
    if let Ok(output) = std::env::var("SUMMIT_LOG_OUTPUT") {
        return parse_output(&output);
    }
    parse_output(&config.output)
}

fn parse_output(output: &str) -> Result<LogOutput, EngineError> {
    match output {
        "stdout" => Ok(LogOutput::Stdout),
        "stderr" => Ok(LogOutput::Stderr),
        "file" => Ok(LogOutput::File),
        other => Err(EngineError::Config(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            other
        ))),
    }
}
