//! Toolchain build orchestration for fetched tools.
//!
//! Each tool is compiled from its source subdirectory with the configured
//! toolchain (`go` by default): `go get` resolves module dependencies and
//! `go build -o <name>` produces the executable. Build environment overrides
//! from the descriptor are applied to the child process only.

use crate::fetch::SourceTree;
use crate::process::{combined_output, command_line, describe_status, run_with_timeout};
use crate::spec::ToolSpec;
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::process::Command;
use std::time::Duration;

/// Directory inside the source path that receives build output.
pub const OUTPUT_DIR: &str = ".dgtools-build";

/// Configuration for the build process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Toolchain program, resolved through `PATH` unless absolute.
    pub toolchain: String,
    /// Limit for each toolchain step.
    pub timeout: Option<Duration>,
    /// Whether to ask the toolchain for verbose output.
    pub verbose: bool,
}

/// A freshly built executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    /// The tool the executable belongs to.
    pub name: ToolName,
    /// Location of the build artifact.
    pub path: Utf8PathBuf,
}

/// Errors arising while building a tool.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The descriptor's source subdirectory is not in the fetched tree.
    #[error("source path {path} not found for {tool}")]
    MissingSourcePath {
        /// The tool being built.
        tool: ToolName,
        /// The expected source directory.
        path: Utf8PathBuf,
    },

    /// The toolchain program could not be started.
    #[error("toolchain `{program}` is not available: {reason}")]
    ToolchainUnavailable {
        /// The program that failed to start.
        program: String,
        /// Description of the failure.
        reason: String,
    },

    /// A toolchain step exited unsuccessfully.
    #[error("`{step}` failed for {tool} ({status}):\n{output}")]
    ToolchainFailed {
        /// The tool being built.
        tool: ToolName,
        /// The command line that failed.
        step: String,
        /// Description of the exit status.
        status: String,
        /// Captured stdout and stderr, verbatim.
        output: String,
    },

    /// The toolchain reported success but produced no executable.
    #[error("build of {tool} produced no executable at {path}")]
    MissingArtifact {
        /// The tool being built.
        tool: ToolName,
        /// The expected artifact location.
        path: Utf8PathBuf,
    },

    /// A toolchain step did not finish in time.
    #[error("`{step}` for {tool} timed out after {timeout_secs} seconds")]
    Timeout {
        /// The tool being built.
        tool: ToolName,
        /// The command line that timed out.
        step: String,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// Compiles a fetched tree into an executable.
#[cfg_attr(test, mockall::automock)]
pub trait Build {
    /// Build `spec` from `tree`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the toolchain fails, times out or leaves
    /// no executable behind.
    fn build(&self, tree: &SourceTree, spec: &ToolSpec) -> Result<Executable, BuildError>;
}

/// Builder invoking an external toolchain.
#[derive(Debug, Clone)]
pub struct Builder {
    config: BuildConfig,
}

impl Builder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Toolchain arguments for each build step, in order.
    #[must_use]
    pub fn steps(&self, artifact: &Utf8Path) -> Vec<Vec<String>> {
        let mut build = vec!["build".to_owned()];
        if self.config.verbose {
            build.push("-v".to_owned());
        }
        build.extend(["-o".to_owned(), artifact.to_string()]);
        vec![vec!["get".to_owned()], build]
    }

    fn run_step(
        &self,
        spec: &ToolSpec,
        source_dir: &Utf8Path,
        args: &[String],
    ) -> Result<(), BuildError> {
        let step = command_line(&self.config.toolchain, args);
        log::debug!("{}: running `{step}` in {source_dir}", spec.name);

        let mut cmd = Command::new(&self.config.toolchain);
        cmd.args(args)
            .current_dir(source_dir.as_std_path())
            .envs(&spec.build_env);

        let output = run_with_timeout(&mut cmd, self.config.timeout).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BuildError::ToolchainUnavailable {
                    program: self.config.toolchain.clone(),
                    reason: e.to_string(),
                }
            } else {
                BuildError::Io {
                    path: source_dir.to_owned(),
                    source: e,
                }
            }
        })?;

        let Some(output) = output else {
            return Err(BuildError::Timeout {
                tool: spec.name.clone(),
                step,
                timeout_secs: self.config.timeout.map_or(0, |t| t.as_secs()),
            });
        };

        if !output.status.success() {
            return Err(BuildError::ToolchainFailed {
                tool: spec.name.clone(),
                step,
                status: describe_status(output.status),
                output: combined_output(&output),
            });
        }

        log::trace!("{}: `{step}` output:\n{}", spec.name, combined_output(&output));
        Ok(())
    }
}

impl Build for Builder {
    fn build(&self, tree: &SourceTree, spec: &ToolSpec) -> Result<Executable, BuildError> {
        let source_dir = tree.root.join(&spec.source_path);
        if !source_dir.is_dir() {
            return Err(BuildError::MissingSourcePath {
                tool: spec.name.clone(),
                path: source_dir,
            });
        }

        let artifact = source_dir.join(OUTPUT_DIR).join(spec.name.as_str());
        prepare_output(&artifact)?;

        for args in self.steps(&artifact) {
            self.run_step(spec, &source_dir, &args)?;
        }

        if !artifact.is_file() {
            return Err(BuildError::MissingArtifact {
                tool: spec.name.clone(),
                path: artifact,
            });
        }

        log::info!("{}: built {artifact}", spec.name);
        Ok(Executable {
            name: spec.name.clone(),
            path: artifact,
        })
    }
}

// A leftover artifact from an earlier build must not satisfy the post-build
// existence check.
fn prepare_output(artifact: &Utf8Path) -> Result<(), BuildError> {
    if let Some(dir) = artifact.parent() {
        std::fs::create_dir_all(dir).map_err(|source| BuildError::Io {
            path: dir.to_owned(),
            source,
        })?;
    }
    match std::fs::remove_file(artifact) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(BuildError::Io {
            path: artifact.to_owned(),
            source: e,
        }),
        _ => Ok(()),
    }
}
