//! Smoke test of installed tools.
//!
//! Every dgtools command prints `Use '<name> help <command>' for extra
//! details` in its help output. Running the installed binary with the probe
//! argument and finding that line is enough to show the right program was
//! installed and that it starts.

use crate::process::{combined_output, describe_status, run_with_timeout};
use crate::spec::ToolSpec;
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::process::Command;
use std::time::Duration;

/// Errors arising while verifying an installed tool.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The probe exited unsuccessfully.
    #[error("{tool} exited with {status}:\n{output}")]
    ProbeFailed {
        /// The tool being probed.
        tool: ToolName,
        /// Description of the exit status.
        status: String,
        /// Captured stdout and stderr.
        output: String,
    },

    /// The probe output lacks the expected help line.
    #[error("{tool} output does not match /{pattern}/:\n{output}")]
    PatternMissing {
        /// The tool being probed.
        tool: ToolName,
        /// The pattern that was expected.
        pattern: String,
        /// Captured stdout.
        output: String,
    },

    /// The probe did not finish in time.
    #[error("{tool} probe timed out after {timeout_secs} seconds")]
    Timeout {
        /// The tool being probed.
        tool: ToolName,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The executable could not be started.
    #[error("failed to run {path}: {source}")]
    Io {
        /// The executable being probed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The expected pattern could not be compiled.
    #[error("invalid verification pattern for {tool}: {reason}")]
    InvalidPattern {
        /// The tool being probed.
        tool: ToolName,
        /// Description of the failure.
        reason: String,
    },
}

/// Checks that an installed executable behaves like the named tool.
#[cfg_attr(test, mockall::automock)]
pub trait Verify {
    /// Probe `executable`, installed for `spec`.
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationError`] if the probe fails, times out or its
    /// output lacks the expected line.
    fn verify(&self, executable: &Utf8Path, spec: &ToolSpec) -> Result<bool, VerificationError>;
}

/// Runs installed executables with a probe argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verifier {
    probe_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Verifier {
    /// Create a verifier passing `probe_args` to each tool.
    #[must_use]
    pub fn new(probe_args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            probe_args,
            timeout,
        }
    }
}

impl Verify for Verifier {
    fn verify(&self, executable: &Utf8Path, spec: &ToolSpec) -> Result<bool, VerificationError> {
        let tool = &spec.name;
        let pattern = expected_pattern(tool).map_err(|e| VerificationError::InvalidPattern {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;

        log::debug!("{tool}: probing {executable} {}", self.probe_args.join(" "));
        let mut cmd = Command::new(executable.as_std_path());
        cmd.args(&self.probe_args);

        let output = run_with_timeout(&mut cmd, self.timeout)
            .map_err(|source| VerificationError::Io {
                path: executable.to_owned(),
                source,
            })?
            .ok_or_else(|| VerificationError::Timeout {
                tool: tool.clone(),
                timeout_secs: self.timeout.map_or(0, |t| t.as_secs()),
            })?;

        if !output.status.success() {
            return Err(VerificationError::ProbeFailed {
                tool: tool.clone(),
                status: describe_status(output.status),
                output: combined_output(&output),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !pattern.is_match(&stdout) {
            return Err(VerificationError::PatternMissing {
                tool: tool.clone(),
                pattern: pattern.as_str().to_owned(),
                output: stdout.into_owned(),
            });
        }

        log::info!("{tool}: verified");
        Ok(true)
    }
}

/// The help line every dgtools command prints, for `name`.
///
/// The name is escaped, so names containing regex metacharacters such as `.`
/// only match literally.
///
/// # Errors
///
/// Returns a regex error if the pattern cannot be compiled.
///
/// # Examples
///
/// ```
/// use dgtools_installer::tool_name::ToolName;
/// use dgtools_installer::verifier::expected_pattern;
///
/// let pattern = expected_pattern(&ToolName::from("tz")).expect("valid pattern");
/// assert!(pattern.is_match("Use 'tz help <command>' for extra details"));
/// ```
pub fn expected_pattern(name: &ToolName) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        "Use '{} help[^']*' for extra details",
        regex::escape(name.as_str())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::tz("tz", "Use 'tz help <command>' for extra details", true)]
    #[case::bare("bake", "Use 'bake help' for extra details", true)]
    #[case::embedded("bt", "SYNOPSIS:\n  bt\n\nUse 'bt help <command>' for extra details\n", true)]
    #[case::other_tool("tz", "Use 'bake help <command>' for extra details", false)]
    #[case::quote_inside("tz", "Use 'tz help 'x'' for extra details", false)]
    #[case::dot_is_literal("a.b", "Use 'axb help' for extra details", false)]
    #[case::dotted_name("a.b", "Use 'a.b help' for extra details", true)]
    fn pattern_matches_help_line(#[case] name: &str, #[case] output: &str, #[case] expected: bool) {
        let pattern = expected_pattern(&ToolName::from(name)).expect("pattern");
        assert_eq!(pattern.is_match(output), expected);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::test_utils::{help_tool_script, write_script};

        fn probe(name: &str, script: &str, timeout: Duration) -> Result<bool, VerificationError> {
            let temp = tempfile::tempdir().expect("temp dir");
            let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
            let exe = root.join(name);
            write_script(exe.as_std_path(), script);

            let spec = ToolSpec::archive(name, "https://example.test/src.tar.gz", None);
            Verifier::new(vec!["--help".to_owned()], Some(timeout)).verify(&exe, &spec)
        }

        #[test]
        fn accepts_tool_printing_help_line() {
            let result = probe("tz", &help_tool_script("tz"), Duration::from_secs(10));
            assert!(matches!(result, Ok(true)));
        }

        #[test]
        fn rejects_output_for_another_tool() {
            let result = probe("tz", &help_tool_script("bake"), Duration::from_secs(10));
            assert!(matches!(
                result,
                Err(VerificationError::PatternMissing { output, .. }) if output.contains("bake")
            ));
        }

        #[test]
        fn reports_non_zero_exit_with_output() {
            let result = probe(
                "tz",
                "#!/bin/sh\necho 'boom' >&2\nexit 3\n",
                Duration::from_secs(10),
            );
            assert!(matches!(
                result,
                Err(VerificationError::ProbeFailed { status, output, .. })
                    if status == "exit code 3" && output.contains("boom")
            ));
        }

        #[test]
        fn reports_timeout() {
            let result = probe("tz", "#!/bin/sh\nsleep 5\n", Duration::from_millis(200));
            assert!(matches!(result, Err(VerificationError::Timeout { .. })));
        }

        #[test]
        fn help_line_on_stderr_is_not_accepted() {
            let result = probe(
                "tz",
                "#!/bin/sh\necho \"Use 'tz help' for extra details\" >&2\n",
                Duration::from_secs(10),
            );
            assert!(matches!(result, Err(VerificationError::PatternMissing { .. })));
        }
    }
}
