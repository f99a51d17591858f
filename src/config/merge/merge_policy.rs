//! Merge rules: defaults first, later sources override earlier ones.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("engine.workers", 4)?
        .set_default("cache.path", ".summit/summary_cache.json")?
        .set_default("provider.provider_type", "fake")
}
