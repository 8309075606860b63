//! Dollar expansion of stored values, applied at read time.
//!
//! ```text
//! $NAME  ${NAME}   environment variable, removed when unset
//! $(cmd)           standard output of `sh -c cmd`, trimmed
//! $$               a literal `$`
//! ```
//!
//! A `$` ending the value is kept as written.
//!
//! Substituted text is never scanned again.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// How `$(cmd)` tokens are handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandOptions<'a> {
    /// Run `$(cmd)` through the shell. Off leaves the token as written.
    pub shell: bool,
    /// Prepended to `PATH` for the child process only.
    pub executable_dirs: &'a [PathBuf],
}

/// Expand `input`, resolving variables through `env`.
pub fn expand<F>(input: &str, opts: &ExpandOptions<'_>, env: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if after.is_empty() {
            out.push('$');
            rest = after;
            break;
        }

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        if let Some(body) = after.strip_prefix('(') {
            let end = body.find(')').unwrap_or(body.len());
            let tail = body.get(end + 1..).unwrap_or_default();
            if opts.shell {
                if let Some(output) = run_command(&body[..end], opts.executable_dirs) {
                    out.push_str(&output);
                }
            } else {
                out.push_str(&rest[pos..rest.len() - tail.len()]);
            }
            rest = tail;
            continue;
        }

        let (name, tail) = match after.strip_prefix('{') {
            Some(body) => {
                let end = body.find('}').unwrap_or(body.len());
                (&body[..end], body.get(end + 1..).unwrap_or_default())
            }
            None => {
                let end = after
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..end], &after[end..])
            }
        };
        if !name.is_empty()
            && let Some(value) = env(name)
        {
            out.push_str(&value);
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// A variable from the process environment, decoded leniently.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
}

fn run_command(cmd: &str, executable_dirs: &[PathBuf]) -> Option<String> {
    let mut command = Command::new("/bin/sh");
    command
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit());
    if !executable_dirs.is_empty() {
        match search_path_with(executable_dirs) {
            Ok(path) => {
                command.env("PATH", path);
            }
            Err(err) => tracing::warn!("not extending PATH for $({cmd}): {err}"),
        }
    }

    match command.output() {
        Ok(output) => {
            if !output.status.success() {
                tracing::debug!(cmd, status = %output.status, "expansion command failed");
            }
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Err(err) => {
            tracing::warn!(cmd, "failed to run expansion command: {err}");
            None
        }
    }
}

fn search_path_with(dirs: &[PathBuf]) -> Result<OsString, std::env::JoinPathsError> {
    let current = std::env::var_os("PATH").unwrap_or_default();
    let inherited: Vec<PathBuf> = std::env::split_paths(&current).collect();
    std::env::join_paths(dirs.iter().chain(inherited.iter()))
}

/// Prepare a path for storage: `$` is escaped and a leading home directory
/// becomes `$HOME`, so the stored value expands back to the same path on
/// read.
pub fn translate_path(path: &str, home: Option<&Path>) -> String {
    let escaped = path.replace('$', "$$");
    if !Path::new(path).is_absolute() {
        return escaped;
    }
    let Some(home) = home.and_then(Path::to_str) else {
        return escaped;
    };
    let home = home.trim_end_matches('/').replace('$', "$$");
    if home.is_empty() {
        return escaped;
    }
    match escaped.strip_prefix(home.as_str()) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("$HOME{rest}"),
        _ => escaped,
    }
}

/// The current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}
