//! CLI domain: parse, route and output only.
//! Route handlers assemble engine components from configuration; the
//! engine itself lives in the library modules.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{CacheCommands, Cli, Commands};
pub use route::RunContext;
