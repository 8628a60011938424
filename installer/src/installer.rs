//! Placement of built executables and completion scripts.
//!
//! The binary is written beside its destination and renamed into place, so a
//! running copy of an older version is never truncated. Completion scripts are
//! rendered from their templates and installed as `{prefix}.{name}.{ext}`.
//! Only the binary is essential: a completion script that cannot be written is
//! reported and skipped.

use crate::builder::Executable;
use crate::completion::{CompletionTemplate, ShellFamily, completion_filename};
use crate::spec::ToolSpec;
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};

/// Mode of installed binaries (rwxr-xr-x).
const BINARY_MODE: u32 = 0o755;

/// Mode of installed completion scripts (rw-r--r--).
const COMPLETION_MODE: u32 = 0o644;

/// Errors arising while installing a tool.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// A target directory cannot be created or written.
    #[error("target directory {path} is not writable: {reason}")]
    TargetNotWritable {
        /// The directory that was checked.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The executable could not be copied into place.
    #[error("failed to copy {from} to {to}: {reason}")]
    CopyFailed {
        /// The build artifact.
        from: Utf8PathBuf,
        /// The install destination.
        to: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A completion template does not contain its placeholder.
    #[error("{shell} completion template does not contain placeholder `{placeholder}`")]
    PlaceholderMissing {
        /// The template's shell family.
        shell: ShellFamily,
        /// The placeholder that was expected.
        placeholder: String,
    },

    /// More than one template was supplied for a shell family.
    #[error("more than one {shell} completion template supplied")]
    DuplicateTemplate {
        /// The repeated shell family.
        shell: ShellFamily,
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

/// Paths written by a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationResult {
    tool: ToolName,
    binary_path: Utf8PathBuf,
    completion_paths: Vec<Utf8PathBuf>,
    verified: bool,
}

impl InstallationResult {
    /// Record an installation that has not been verified yet.
    #[must_use]
    pub fn new(
        tool: ToolName,
        binary_path: Utf8PathBuf,
        completion_paths: Vec<Utf8PathBuf>,
    ) -> Self {
        Self {
            tool,
            binary_path,
            completion_paths,
            verified: false,
        }
    }

    /// The same installation with its verification outcome.
    #[must_use]
    pub fn with_verified(self, verified: bool) -> Self {
        Self { verified, ..self }
    }

    /// The installed tool.
    #[must_use]
    pub fn tool(&self) -> &ToolName {
        &self.tool
    }

    /// Location of the installed executable.
    #[must_use]
    pub fn binary_path(&self) -> &Utf8Path {
        &self.binary_path
    }

    /// Installed completion scripts, bash before zsh.
    #[must_use]
    pub fn completion_paths(&self) -> &[Utf8PathBuf] {
        &self.completion_paths
    }

    /// Whether the installed executable passed its smoke test.
    #[must_use]
    pub fn verified(&self) -> bool {
        self.verified
    }
}

/// Places an executable and its completion scripts.
#[cfg_attr(test, mockall::automock)]
pub trait Install {
    /// Install `executable` for `spec` and render `templates`.
    ///
    /// # Errors
    ///
    /// Returns an [`InstallError`] if the template set is invalid or the
    /// binary cannot be installed.
    fn install(
        &self,
        executable: &Executable,
        spec: &ToolSpec,
        templates: &[CompletionTemplate],
    ) -> Result<InstallationResult, InstallError>;
}

/// Installs into a binary directory and per-shell completion directories.
#[derive(Debug, Clone)]
pub struct Installer {
    bin_dir: Utf8PathBuf,
    completion_prefix: String,
}

impl Installer {
    /// Create an installer writing binaries to `bin_dir`.
    #[must_use]
    pub fn new(bin_dir: Utf8PathBuf, completion_prefix: &str) -> Self {
        Self {
            bin_dir,
            completion_prefix: completion_prefix.to_owned(),
        }
    }

    /// Ensure the binary directory exists and is writable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or is not writable.
    pub fn prepare(&self) -> Result<(), InstallError> {
        ensure_writable(&self.bin_dir)
    }

    /// Destination of the executable for `name`.
    #[must_use]
    pub fn binary_path(&self, name: &ToolName) -> Utf8PathBuf {
        self.bin_dir.join(name.as_str())
    }

    /// Destination of the completion script for `name` from `template`.
    #[must_use]
    pub fn completion_path(&self, name: &ToolName, template: &CompletionTemplate) -> Utf8PathBuf {
        template
            .install_dir()
            .join(completion_filename(&self.completion_prefix, name, template.shell()))
    }

    /// Copy `executable` into the binary directory, replacing any prior copy.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::CopyFailed`] if the copy or rename fails.
    pub fn install_binary(&self, executable: &Executable) -> Result<Utf8PathBuf, InstallError> {
        let dest = self.binary_path(&executable.name);
        let copy_failed = |reason: String| InstallError::CopyFailed {
            from: executable.path.clone(),
            to: dest.clone(),
            reason,
        };

        let mut source = fs::File::open(&executable.path).map_err(|e| copy_failed(e.to_string()))?;
        let mut staged =
            tempfile::NamedTempFile::new_in(&self.bin_dir).map_err(|e| copy_failed(e.to_string()))?;
        io::copy(&mut source, &mut staged).map_err(|e| copy_failed(e.to_string()))?;
        set_mode(staged.path(), BINARY_MODE).map_err(|e| copy_failed(e.to_string()))?;
        staged
            .persist(&dest)
            .map_err(|e| copy_failed(e.error.to_string()))?;

        log::info!("{}: installed {dest}", executable.name);
        Ok(dest)
    }

    /// Render `template` for `name` and write it to its install directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Io`] if the directory or file cannot be
    /// written.
    pub fn install_completion(
        &self,
        name: &ToolName,
        template: &CompletionTemplate,
    ) -> Result<Utf8PathBuf, InstallError> {
        let dir = template.install_dir();
        let dest = self.completion_path(name, template);
        let io_error = |source: io::Error| InstallError::Io {
            path: dest.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(|source| InstallError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        staged
            .write_all(template.render(name).as_bytes())
            .map_err(io_error)?;
        set_mode(staged.path(), COMPLETION_MODE).map_err(io_error)?;
        staged.persist(&dest).map_err(|e| io_error(e.error))?;

        Ok(dest)
    }
}

impl Install for Installer {
    fn install(
        &self,
        executable: &Executable,
        spec: &ToolSpec,
        templates: &[CompletionTemplate],
    ) -> Result<InstallationResult, InstallError> {
        let ordered = ordered_templates(templates)?;

        self.prepare()?;
        let binary_path = self.install_binary(executable)?;

        let mut completion_paths = Vec::with_capacity(ordered.len());
        for template in ordered {
            match self.install_completion(&spec.name, template) {
                Ok(path) => {
                    log::debug!("{}: installed {} completion {path}", spec.name, template.shell());
                    if template.shell() == ShellFamily::Zsh {
                        log::info!(
                            "{}: to enable zsh completion add `source {path}` to your .zshrc",
                            spec.name
                        );
                    }
                    completion_paths.push(path);
                }
                Err(e) => log::warn!(
                    "{}: skipping {} completion: {e}",
                    spec.name,
                    template.shell()
                ),
            }
        }

        Ok(InstallationResult::new(
            spec.name.clone(),
            binary_path,
            completion_paths,
        ))
    }
}

/// Templates sorted bash before zsh, rejecting repeated shell families.
fn ordered_templates(
    templates: &[CompletionTemplate],
) -> Result<Vec<&CompletionTemplate>, InstallError> {
    let mut seen = BTreeSet::new();
    for template in templates {
        if !seen.insert(template.shell()) {
            return Err(InstallError::DuplicateTemplate {
                shell: template.shell(),
            });
        }
    }
    let mut ordered: Vec<_> = templates.iter().collect();
    ordered.sort_by_key(|t| t.shell());
    Ok(ordered)
}

fn ensure_writable(dir: &Utf8Path) -> Result<(), InstallError> {
    let not_writable = |e: io::Error| InstallError::TargetNotWritable {
        path: dir.to_owned(),
        reason: e.to_string(),
    };
    fs::create_dir_all(dir).map_err(not_writable)?;

    // Verify writability by attempting to create a temp file
    let test_path = dir.join(".dgtools-installer-test");
    fs::write(&test_path, b"test").map_err(not_writable)?;
    if let Err(e) = fs::remove_file(&test_path) {
        log::debug!("failed to remove {test_path}: {e}");
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &std::path::Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
