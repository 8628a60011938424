//! Git operations for live source references.
//!
//! A live ref is cloned once into the fetch cache and brought up to date on
//! later fetches. Every operation runs under the caller's timeout so a
//! stalled network cannot hang the pipeline.

use super::FetchError;
use crate::process::{describe_status, run_with_timeout};
use camino::Utf8Path;
use std::process::{Command, Output};
use std::time::Duration;

/// Clones `branch` of `repository` into `target`.
///
/// Only the tip of the branch is fetched.
///
/// # Errors
///
/// Returns [`FetchError::Git`] if the clone fails, or
/// [`FetchError::Timeout`] if it does not finish in time.
pub fn clone_branch(
    repository: &str,
    branch: &str,
    target: &Utf8Path,
    timeout: Option<Duration>,
) -> Result<(), FetchError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|source| FetchError::Io {
            path: parent.to_owned(),
            source,
        })?;
    }

    run_git(&clone_args(repository, branch, target), None, "clone", timeout)
}

// `--` keeps a repository that looks like an option from being parsed as one.
fn clone_args<'a>(repository: &'a str, branch: &'a str, target: &'a Utf8Path) -> [&'a str; 8] {
    [
        "clone",
        "--depth",
        "1",
        "--branch",
        branch,
        "--",
        repository,
        target.as_str(),
    ]
}

/// Updates an existing checkout to the tip of `origin/{branch}`.
///
/// Local modifications are discarded.
///
/// # Errors
///
/// Returns [`FetchError::Git`] if any step fails, or
/// [`FetchError::Timeout`] if one does not finish in time.
pub fn update_branch(
    checkout: &Utf8Path,
    branch: &str,
    timeout: Option<Duration>,
) -> Result<(), FetchError> {
    run_git(
        &["fetch", "--depth", "1", "origin", branch],
        Some(checkout),
        "fetch",
        timeout,
    )?;
    let remote = format!("origin/{branch}");
    run_git(
        &["checkout", "--force", "-B", branch, &remote],
        Some(checkout),
        "checkout",
        timeout,
    )?;
    run_git(&["reset", "--hard", &remote], Some(checkout), "reset", timeout)
}

/// Whether `dir` looks like a git checkout.
#[must_use]
pub fn is_checkout(dir: &Utf8Path) -> bool {
    dir.join(".git").exists()
}

fn run_git(
    args: &[&str],
    working_dir: Option<&Utf8Path>,
    operation: &'static str,
    timeout: Option<Duration>,
) -> Result<(), FetchError> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = working_dir {
        cmd.current_dir(dir.as_std_path());
    }

    let output = run_with_timeout(&mut cmd, timeout).map_err(|e| FetchError::Git {
        operation,
        message: format!("failed to run git: {e}"),
    })?;

    match output {
        None => Err(FetchError::Timeout {
            operation: format!("git {operation}"),
            timeout_secs: timeout.map_or(0, |t| t.as_secs()),
        }),
        Some(output) if output.status.success() => Ok(()),
        Some(output) => Err(git_failure(operation, &output)),
    }
}

fn git_failure(operation: &'static str, output: &Output) -> FetchError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
        "" => describe_status(output.status),
        trimmed => trimmed.to_owned(),
    };
    FetchError::Git { operation, message }
}
