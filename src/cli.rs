//! CLI domain: parse, route, output and presentation only.
//! Document semantics live in [`crate::database`]; the route table just dispatches.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ResolverChoice};
pub use presentation::{format_document_json, format_document_text, format_save_outcome};
pub use route::{parse_assignment, RunContext};
