//! Output formatting for the installer CLI.
//!
//! Progress and summaries go to stderr as plain lines. With `--json` a
//! machine-readable report of every tool is written to stdout instead.

use crate::error::PipelineError;
use crate::installer::InstallationResult;
use crate::pipeline::{PipelineState, RunOutcome};
use crate::tool_name::ToolName;
use serde::Serialize;
use std::fmt::Display;
use std::io::Write;

/// Write `message` and a newline, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; nothing useful to do on failure.
    }
}

/// Format one state transition as a progress line.
#[must_use]
pub fn progress_line(tool: &ToolName, state: &PipelineState) -> String {
    format!("==> {tool}: {state}")
}

/// Format the line reported for one finished tool.
#[must_use]
pub fn outcome_line(outcome: &RunOutcome) -> String {
    match outcome {
        Ok(result) => {
            let mut line = format!("{}: installed {}", result.tool(), result.binary_path());
            if !result.completion_paths().is_empty() {
                line.push_str(&format!(
                    " ({} completion script(s))",
                    result.completion_paths().len()
                ));
            }
            line
        }
        Err(error) => error.to_string(),
    }
}

/// Format the closing summary.
///
/// # Examples
///
/// ```
/// use dgtools_installer::output::summary_line;
///
/// assert_eq!(summary_line(3, 0), "Installed 3 tool(s)");
/// assert_eq!(summary_line(3, 1), "Installed 2 tool(s), 1 failed");
/// ```
#[must_use]
pub fn summary_line(total: usize, failed: usize) -> String {
    let installed = total.saturating_sub(failed);
    if failed == 0 {
        format!("Installed {installed} tool(s)")
    } else {
        format!("Installed {installed} tool(s), {failed} failed")
    }
}

/// One failed tool in a JSON report.
#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    /// The tool that failed.
    pub tool: &'a ToolName,
    /// Stage that failed.
    pub stage: crate::error::Stage,
    /// Rendered cause.
    pub error: String,
}

impl<'a> From<&'a PipelineError> for FailureReport<'a> {
    fn from(error: &'a PipelineError) -> Self {
        Self {
            tool: &error.tool,
            stage: error.stage,
            error: error.cause.to_string(),
        }
    }
}

/// Machine-readable report of a run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// Tools that completed every stage.
    pub installed: Vec<&'a InstallationResult>,
    /// Tools that stopped at a failing stage.
    pub failed: Vec<FailureReport<'a>>,
}

impl<'a> RunReport<'a> {
    /// Partition outcomes into successes and failures, keeping order.
    #[must_use]
    pub fn new(outcomes: &'a [RunOutcome]) -> Self {
        let mut installed = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => installed.push(result),
                Err(error) => failed.push(FailureReport::from(error)),
            }
        }
        Self { installed, failed }
    }
}

/// Serialise `report` as pretty JSON followed by a newline.
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn write_json_report(out: &mut dyn Write, report: &RunReport<'_>) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::fetch::FetchError;
    use camino::Utf8PathBuf;

    fn installed(name: &str) -> RunOutcome {
        Ok(InstallationResult::new(
            ToolName::from(name),
            Utf8PathBuf::from(format!("/home/u/bin/{name}")),
            vec![Utf8PathBuf::from(format!(
                "/home/u/share/bash-completion/completions/dgtools.{name}.bash"
            ))],
        )
        .with_verified(true))
    }

    fn failed(name: &str) -> RunOutcome {
        Err(PipelineError::new(
            ToolName::from(name),
            FetchError::NotFound {
                url: "https://example.test/missing.tar.gz".to_owned(),
            },
        ))
    }

    #[test]
    fn outcome_line_counts_completions() {
        let line = outcome_line(&installed("tz"));
        assert_eq!(line, "tz: installed /home/u/bin/tz (1 completion script(s))");
    }

    #[test]
    fn outcome_line_names_failed_stage() {
        let line = outcome_line(&failed("bt"));
        assert!(line.starts_with("bt: fetch failed"), "{line}");
    }

    #[test]
    fn progress_line_shows_state() {
        let line = progress_line(&ToolName::from("tz"), &PipelineState::Fetched);
        assert_eq!(line, format!("==> tz: {}", PipelineState::Fetched));
    }

    #[test]
    fn json_report_partitions_outcomes() {
        let outcomes = vec![installed("tz"), failed("bt")];
        let report = RunReport::new(&outcomes);
        assert_eq!(report.installed.len(), 1);
        assert_eq!(report.failed.first().map(|f| f.stage), Some(Stage::Fetch));

        let mut out = Vec::new();
        write_json_report(&mut out, &report).expect("write report");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("valid json");

        assert_eq!(value["installed"][0]["tool"], "tz");
        assert_eq!(value["installed"][0]["verified"], true);
        assert_eq!(value["failed"][0]["tool"], "bt");
        assert_eq!(value["failed"][0]["stage"], "fetch");
    }

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut buffer = Vec::new();
        write_stderr_line(&mut buffer, "hello");
        assert_eq!(buffer, b"hello\n");
    }
}
