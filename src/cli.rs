//! CLI domain: parse, route and presentation only.
//! Generation itself lives in `generation`; commands just wire it up.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands, ConfigCommands};
pub use presentation::{format_plan_status, format_run_summary};
pub use route::RunContext;
