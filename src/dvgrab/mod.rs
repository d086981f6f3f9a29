//! dvgrab command line handling

pub mod args;
pub mod tool;

pub use args::{build_args, output_prefix, ArgRule, CLIP_STEM, RULES};
pub use tool::{resolve_tool, shell_join, shell_quote, tool_exists};
