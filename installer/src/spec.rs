//! Tool descriptors consumed by the packaging pipeline.
//!
//! A [`ToolSpec`] is the immutable description of one packaged tool: what it
//! is called, where its source lives inside the fetched tree, where the source
//! comes from and which environment overrides its build needs. It carries no
//! behaviour beyond [`ToolSpec::validate`].

use crate::sha256_digest::Sha256Digest;
use crate::tool_name::{ToolName, validate_tool_name};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors describing a malformed tool descriptor.
///
/// These are raised before any external action is taken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// The tool name is empty.
    #[error("tool name must not be empty")]
    EmptyName,

    /// The tool name contains a character that is unsafe for substitution.
    #[error("invalid tool name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: ToolName,
        /// Description of the violation.
        reason: String,
    },

    /// The descriptor declares neither a versioned archive nor a live ref.
    #[error("{tool}: no source declared; expected a versioned archive or a live branch")]
    MissingSource {
        /// Name of the tool.
        tool: ToolName,
    },

    /// The declared source reference is malformed.
    #[error("{tool}: invalid source: {reason}")]
    InvalidSource {
        /// Name of the tool.
        tool: ToolName,
        /// Description of the violation.
        reason: String,
    },

    /// The source subdirectory is absolute or escapes the source tree.
    #[error("{tool}: invalid source path {path:?}: {reason}")]
    InvalidSourcePath {
        /// Name of the tool.
        tool: ToolName,
        /// The rejected path.
        path: Utf8PathBuf,
        /// Description of the violation.
        reason: String,
    },

    /// A build environment override cannot be passed to a child process.
    #[error("{tool}: invalid build environment entry {key:?}: {reason}")]
    InvalidBuildEnv {
        /// Name of the tool.
        tool: ToolName,
        /// The offending variable name.
        key: String,
        /// Description of the violation.
        reason: String,
    },

    /// A SHA-256 digest is not a valid 64-character lowercase hex string.
    #[error("invalid SHA-256 digest: {reason}")]
    InvalidDigest {
        /// Description of the validation failure.
        reason: String,
    },

    /// The same tool name was requested more than once in a single run.
    #[error("tool {tool} was requested more than once")]
    DuplicateTool {
        /// Name of the duplicated tool.
        tool: ToolName,
    },
}

/// Where a tool's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceRef {
    /// A tagged release archive, optionally pinned by checksum.
    VersionedArchive(ArchiveSource),
    /// A mutable branch of a git repository, for development use.
    LiveRef(LiveSource),
}

/// A versioned `.tar.gz` source archive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSource {
    /// Download URL of the archive.
    pub url: String,
    /// Expected SHA-256 of the archive bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<Sha256Digest>,
}

/// A live git branch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LiveSource {
    /// Clone URL of the repository.
    pub repository: String,
    /// Branch to check out.
    pub branch: String,
}

impl SourceRef {
    /// Return true when the fetched content can be checked against a digest.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        matches!(
            self,
            Self::VersionedArchive(ArchiveSource {
                sha256: Some(_),
                ..
            })
        )
    }
}

/// Immutable descriptor of one packaged tool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    /// Tool name; also the installed binary name and substitution token.
    pub name: ToolName,
    /// One-line description.
    #[serde(default)]
    pub description: String,
    /// Project homepage, used for reporting only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Subdirectory of the source tree containing the tool's source.
    pub source_path: Utf8PathBuf,
    /// Subdirectory of the source tree shipping `completions.bash` and
    /// `completions.zsh` templates, which replace the configured ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completions_dir: Option<Utf8PathBuf>,
    /// Where the source comes from.
    #[serde(default, rename = "source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<SourceRef>,
    /// Environment overrides applied to the build invocation only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub build_env: BTreeMap<String, String>,
}

impl ToolSpec {
    /// Create a descriptor for a versioned archive source.
    ///
    /// # Examples
    ///
    /// ```
    /// use dgtools_installer::sha256_digest::Sha256Digest;
    /// use dgtools_installer::spec::ToolSpec;
    ///
    /// let digest = Sha256Digest::try_from(
    ///     "1ffaae8225ef3d7e3fdcf61348d2fb2b100bcd959cfaeed5ddeef7038c844786",
    /// )
    /// .unwrap();
    /// let spec = ToolSpec::archive(
    ///     "tz",
    ///     "https://github.com/DavidGamba/dgtools/archive/refs/tags/tz/v0.1.0.tar.gz",
    ///     Some(digest),
    /// );
    /// assert!(spec.validate().is_ok());
    /// ```
    #[must_use]
    pub fn archive(name: &str, url: &str, sha256: Option<Sha256Digest>) -> Self {
        Self::with_source(
            name,
            SourceRef::VersionedArchive(ArchiveSource {
                url: url.to_owned(),
                sha256,
            }),
        )
    }

    /// Create a descriptor for a live branch source.
    #[must_use]
    pub fn live(name: &str, repository: &str, branch: &str) -> Self {
        Self::with_source(
            name,
            SourceRef::LiveRef(LiveSource {
                repository: repository.to_owned(),
                branch: branch.to_owned(),
            }),
        )
    }

    fn with_source(name: &str, source_ref: SourceRef) -> Self {
        Self {
            name: ToolName::from(name),
            description: String::new(),
            homepage: None,
            source_path: Utf8PathBuf::from(name),
            completions_dir: None,
            source_ref: Some(source_ref),
            build_env: BTreeMap::new(),
        }
    }

    /// Check the descriptor before any external action is taken.
    ///
    /// # Errors
    ///
    /// Returns a [`SpecError`] when the name is not a safe token, no source is
    /// declared, the source reference is malformed, the source path is
    /// absolute or escapes the tree, or a build environment entry cannot be
    /// passed to a child process.
    pub fn validate(&self) -> Result<(), SpecError> {
        validate_tool_name(&self.name)?;
        self.validate_source()?;
        self.validate_source_path()?;
        self.validate_build_env()
    }

    fn validate_source(&self) -> Result<(), SpecError> {
        let invalid = |reason: &str| SpecError::InvalidSource {
            tool: self.name.clone(),
            reason: reason.to_owned(),
        };

        match &self.source_ref {
            None => Err(SpecError::MissingSource {
                tool: self.name.clone(),
            }),
            Some(SourceRef::VersionedArchive(archive)) => {
                if archive.url.trim().is_empty() {
                    return Err(invalid("archive url is empty"));
                }
                Ok(())
            }
            Some(SourceRef::LiveRef(live)) => {
                if live.repository.trim().is_empty() {
                    return Err(invalid("repository is empty"));
                }
                if live.repository.starts_with('-') {
                    return Err(invalid("repository must not start with '-'"));
                }
                if live.branch.trim().is_empty() {
                    return Err(invalid("branch is empty"));
                }
                if live.branch.starts_with('-') {
                    return Err(invalid("branch must not start with '-'"));
                }
                Ok(())
            }
        }
    }

    fn validate_source_path(&self) -> Result<(), SpecError> {
        self.validate_tree_path(&self.source_path)?;
        match &self.completions_dir {
            Some(dir) => self.validate_tree_path(dir),
            None => Ok(()),
        }
    }

    fn validate_tree_path(&self, path: &Utf8Path) -> Result<(), SpecError> {
        let invalid = |reason: &str| SpecError::InvalidSourcePath {
            tool: self.name.clone(),
            path: path.to_owned(),
            reason: reason.to_owned(),
        };

        if path.as_str().is_empty() {
            return Err(invalid("path is empty; use \".\" for the tree root"));
        }
        if path.is_absolute() || path.has_root() {
            return Err(invalid("path must be relative to the source tree"));
        }
        if escapes_root(path) {
            return Err(invalid("path must not contain '..'"));
        }
        Ok(())
    }

    fn validate_build_env(&self) -> Result<(), SpecError> {
        for (key, value) in &self.build_env {
            let invalid = |reason: &str| SpecError::InvalidBuildEnv {
                tool: self.name.clone(),
                key: key.clone(),
                reason: reason.to_owned(),
            };

            if key.is_empty() {
                return Err(invalid("variable name is empty"));
            }
            if key.contains('=') || key.contains('\0') {
                return Err(invalid("variable name contains '=' or NUL"));
            }
            if value.contains('\0') {
                return Err(invalid("value contains NUL"));
            }
        }
        Ok(())
    }
}

fn escapes_root(path: &Utf8Path) -> bool {
    path.components()
        .any(|component| matches!(component, camino::Utf8Component::ParentDir))
}

/// Reject descriptors that share a tool name.
///
/// # Errors
///
/// Returns [`SpecError::DuplicateTool`] for the first repeated name.
pub fn ensure_unique_names(specs: &[ToolSpec]) -> Result<(), SpecError> {
    let mut seen = std::collections::BTreeSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(SpecError::DuplicateTool {
                tool: spec.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tz_spec() -> ToolSpec {
        let digest = Sha256Digest::try_from(
            "1ffaae8225ef3d7e3fdcf61348d2fb2b100bcd959cfaeed5ddeef7038c844786",
        )
        .expect("known good digest");
        ToolSpec::archive(
            "tz",
            "https://github.com/DavidGamba/dgtools/archive/refs/tags/tz/v0.1.0.tar.gz",
            Some(digest),
        )
    }

    #[test]
    fn valid_archive_spec_passes() {
        let spec = tz_spec();
        assert!(spec.validate().is_ok());
        assert!(spec.source_ref.as_ref().is_some_and(SourceRef::is_pinned));
    }

    #[test]
    fn missing_source_is_rejected() {
        let spec = ToolSpec {
            source_ref: None,
            ..tz_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(SpecError::MissingSource { .. })
        ));
    }

    #[rstest]
    #[case::absolute("/etc")]
    #[case::parent("../tz")]
    #[case::nested_parent("tz/../../etc")]
    #[case::empty("")]
    fn unsafe_source_paths_are_rejected(#[case] path: &str) {
        let spec = ToolSpec {
            source_path: Utf8PathBuf::from(path),
            ..tz_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(SpecError::InvalidSourcePath { .. })
        ));
    }

    #[test]
    fn escaping_completions_dir_is_rejected() {
        let spec = ToolSpec {
            completions_dir: Some(Utf8PathBuf::from("../HomebrewFormula")),
            ..tz_spec()
        };
        assert!(matches!(
            spec.validate(),
            Err(SpecError::InvalidSourcePath { path, .. }) if path == "../HomebrewFormula"
        ));
    }

    #[rstest]
    #[case::empty_repository("", "master")]
    #[case::empty_branch("https://github.com/DavidGamba/dgtools", "")]
    #[case::option_branch("https://github.com/DavidGamba/dgtools", "--upload-pack=x")]
    #[case::option_repository("--upload-pack=touch /tmp/pwned", "master")]
    fn malformed_live_refs_are_rejected(#[case] repository: &str, #[case] branch: &str) {
        let spec = ToolSpec::live("bake", repository, branch);
        assert!(matches!(
            spec.validate(),
            Err(SpecError::InvalidSource { .. })
        ));
    }

    #[rstest]
    #[case::empty_key("", "1")]
    #[case::equals_in_key("A=B", "1")]
    #[case::nul_in_value("GOEXPERIMENT", "range\0func")]
    fn malformed_build_env_is_rejected(#[case] key: &str, #[case] value: &str) {
        let mut spec = tz_spec();
        spec.build_env.insert(key.to_owned(), value.to_owned());
        assert!(matches!(
            spec.validate(),
            Err(SpecError::InvalidBuildEnv { .. })
        ));
    }

    #[test]
    fn invalid_name_is_reported_before_source() {
        let spec = ToolSpec {
            name: ToolName::from("tz;rm"),
            source_ref: None,
            ..tz_spec()
        };
        assert!(matches!(spec.validate(), Err(SpecError::InvalidName { .. })));
    }

    #[test]
    fn live_ref_is_not_pinned() {
        let spec = ToolSpec::live("bake", "https://github.com/DavidGamba/dgtools", "master");
        assert!(spec.validate().is_ok());
        assert!(!spec.source_ref.as_ref().is_some_and(SourceRef::is_pinned));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let specs = vec![tz_spec(), tz_spec()];
        assert!(matches!(
            ensure_unique_names(&specs),
            Err(SpecError::DuplicateTool { tool }) if tool.as_str() == "tz"
        ));
    }
}
