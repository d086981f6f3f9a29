//! dvgrab executable lookup and command rendering

use std::path::PathBuf;

/// Locate the dvgrab executable the way the process environment would
///
/// Names containing a path separator are checked as paths, bare names are
/// searched on `PATH`.
pub fn resolve_tool(tool: &str) -> Option<PathBuf> {
    which::which(tool).ok()
}

pub fn tool_exists(tool: &str) -> bool {
    resolve_tool(tool).is_some()
}

/// Render an argument vector as a line a POSIX shell would accept
pub fn shell_join<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| shell_quote(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(is_shell_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', r#"'"'"'"#))
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)
}
