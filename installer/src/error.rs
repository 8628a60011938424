//! Error types for the dgtools installer.
//!
//! Each pipeline stage has its own error enum next to the component that
//! raises it. [`StageError`] unifies them, [`PipelineError`] attaches the tool
//! and the stage that failed, and [`InstallerError`] covers everything the CLI
//! can report.

use crate::builder::BuildError;
use crate::fetch::FetchError;
use crate::formula::FormulaError;
use crate::installer::InstallError;
use crate::spec::SpecError;
use crate::tool_name::ToolName;
use crate::verifier::VerificationError;
use camino::Utf8PathBuf;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Descriptor validation, before any external action.
    Validate,
    /// Source retrieval and integrity check.
    Fetch,
    /// Compilation of the tool.
    Build,
    /// Binary and completion installation.
    Install,
    /// Smoke test of the installed binary.
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Fetch => "fetch",
            Self::Build => "build",
            Self::Install => "install",
            Self::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// The failure raised by a single stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The descriptor is malformed.
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
    /// Fetching the source failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Building the tool failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Installing the binary failed.
    #[error(transparent)]
    Install(#[from] InstallError),
    /// The installed tool failed its smoke test.
    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl StageError {
    /// The stage this error belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidSpec(_) => Stage::Validate,
            Self::Fetch(_) => Stage::Fetch,
            Self::Build(_) => Stage::Build,
            Self::Install(_) => Stage::Install,
            Self::Verification(_) => Stage::Verify,
        }
    }
}

/// A pipeline run that stopped at `stage`.
#[derive(Debug, Error)]
#[error("{tool}: {stage} failed: {cause}")]
pub struct PipelineError {
    /// The tool being processed.
    pub tool: ToolName,
    /// The stage that failed.
    pub stage: Stage,
    /// What went wrong.
    #[source]
    pub cause: StageError,
}

impl PipelineError {
    /// Attribute a stage error to `tool`.
    #[must_use]
    pub fn new(tool: ToolName, cause: impl Into<StageError>) -> Self {
        let cause = cause.into();
        Self {
            tool,
            stage: cause.stage(),
            cause,
        }
    }
}

/// Errors surfaced by the installer CLI.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// A formula file could not be loaded.
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// A descriptor or request is malformed.
    #[error("invalid formula: {0}")]
    InvalidSpec(#[from] SpecError),

    /// A single tool's pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] Box<PipelineError>),

    /// Completion setup failed before any tool was processed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// One or more tools failed; details were already reported.
    #[error("{failed} of {total} tool(s) failed")]
    ToolsFailed {
        /// Number of failed tools.
        failed: usize,
        /// Number of requested tools.
        total: usize,
    },

    /// Configuration could not be read, parsed or resolved.
    #[error("configuration error in {path}: {reason}")]
    Config {
        /// File the configuration came from.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// No formulae were selected.
    #[error("no formulae selected; name one or more formulae or pass --all")]
    NothingSelected,

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl From<PipelineError> for InstallerError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(Box::new(err))
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;
