//! Engine configuration.
//!
//! Settings come from an optional TOML file and are then overridden by CLI
//! flags. Unset directories fall back to per-user defaults derived from
//! [`BaseDirs`]. Values are deserialised with `#[serde(default)]` so a file
//! only needs to mention what it changes.

use crate::completion::{CompletionTemplate, ShellFamily};
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::installer::InstallError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::time::Duration;

/// Application directory name used under the base directories.
pub const APP_DIR: &str = "dgtools";

/// Configuration file name looked up under the config directory.
pub const CONFIG_FILE: &str = "installer.toml";

/// Default completion filename prefix.
pub const DEFAULT_COMPLETION_PREFIX: &str = "dgtools";

/// Default build toolchain program.
pub const DEFAULT_TOOLCHAIN: &str = "go";

/// Default probe argument passed to installed tools.
pub const DEFAULT_PROBE_ARG: &str = "--help";

/// Engine configuration as written in `installer.toml`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory searched for formulae requested by name.
    pub formula_dir: Option<Utf8PathBuf>,
    /// Directory holding fetched source trees.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Directory receiving installed binaries.
    pub bin_dir: Option<Utf8PathBuf>,
    /// Directory receiving bash completion scripts.
    pub bash_completion_dir: Option<Utf8PathBuf>,
    /// Directory receiving zsh completion scripts.
    pub zsh_completion_dir: Option<Utf8PathBuf>,
    /// Custom bash completion template; the bundled one is used when unset.
    pub bash_template: Option<Utf8PathBuf>,
    /// Custom zsh completion template; the bundled one is used when unset.
    pub zsh_template: Option<Utf8PathBuf>,
    /// Prefix of installed completion filenames.
    pub completion_prefix: String,
    /// Toolchain program invoked to build tools.
    pub toolchain: String,
    /// Arguments passed to an installed tool to probe it.
    pub probe_args: Vec<String>,
    /// Fetch timeout in seconds; zero disables the timeout.
    pub fetch_timeout_secs: u64,
    /// Build timeout in seconds per toolchain step; zero disables the timeout.
    pub build_timeout_secs: u64,
    /// Probe timeout in seconds; zero disables the timeout.
    pub probe_timeout_secs: u64,
    /// Maximum number of tools processed concurrently.
    pub jobs: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formula_dir: None,
            cache_dir: None,
            bin_dir: None,
            bash_completion_dir: None,
            zsh_completion_dir: None,
            bash_template: None,
            zsh_template: None,
            completion_prefix: DEFAULT_COMPLETION_PREFIX.to_owned(),
            toolchain: DEFAULT_TOOLCHAIN.to_owned(),
            probe_args: vec![DEFAULT_PROBE_ARG.to_owned()],
            fetch_timeout_secs: 300,
            build_timeout_secs: 600,
            probe_timeout_secs: 30,
            jobs: None,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if the text is not valid
    /// configuration.
    pub fn from_toml(source: &str, origin: &Utf8Path) -> Result<Self> {
        toml::from_str(source).map_err(|e| InstallerError::Config {
            path: origin.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from `explicit`, or from the default location.
    ///
    /// An explicitly named file must exist. The default file
    /// (`{config_dir}/dgtools/installer.toml`) is optional.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if a file cannot be read or parsed.
    pub fn load(explicit: Option<&Utf8Path>, dirs: &dyn BaseDirs) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_owned(), true),
            None => match dirs.config_dir() {
                Some(dir) => (dir.join(APP_DIR).join(CONFIG_FILE), false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(source) => {
                log::debug!("loading configuration from {path}");
                Self::from_toml(&source, &path)
            }
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                log::trace!("no configuration file at {path}; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(InstallerError::Config {
                path,
                reason: e.to_string(),
            }),
        }
    }

    /// Fill unset directories from `dirs` and produce runnable settings.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] if a directory is unset and no
    /// default can be derived.
    pub fn resolve(&self, dirs: &dyn BaseDirs) -> Result<ResolvedConfig> {
        let cache_dir = pick(&self.cache_dir, "cache_dir", || {
            dirs.cache_dir().map(|d| d.join(APP_DIR))
        })?;
        let bin_dir = pick(&self.bin_dir, "bin_dir", || dirs.bin_dir())?;
        let bash_completion_dir = pick(&self.bash_completion_dir, "bash_completion_dir", || {
            dirs.data_local_dir()
                .map(|d| d.join("bash-completion").join("completions"))
        })?;
        let zsh_completion_dir = pick(&self.zsh_completion_dir, "zsh_completion_dir", || {
            dirs.data_local_dir()
                .map(|d| d.join("zsh").join("site-functions"))
        })?;

        Ok(ResolvedConfig {
            formula_dir: self.formula_dir.clone(),
            cache_dir,
            bin_dir,
            bash_completion_dir,
            zsh_completion_dir,
            bash_template: self.bash_template.clone(),
            zsh_template: self.zsh_template.clone(),
            completion_prefix: self.completion_prefix.clone(),
            toolchain: self.toolchain.clone(),
            probe_args: self.probe_args.clone(),
            fetch_timeout: timeout(self.fetch_timeout_secs),
            build_timeout: timeout(self.build_timeout_secs),
            probe_timeout: timeout(self.probe_timeout_secs),
            jobs: self.jobs,
        })
    }
}

fn pick<F>(value: &Option<Utf8PathBuf>, field: &str, default: F) -> Result<Utf8PathBuf>
where
    F: FnOnce() -> Option<Utf8PathBuf>,
{
    value
        .clone()
        .or_else(default)
        .ok_or_else(|| InstallerError::Config {
            path: Utf8PathBuf::from(CONFIG_FILE),
            reason: format!("{field} is not set and no default could be determined"),
        })
}

const fn timeout(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

/// Fully resolved settings used to assemble a packaging engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Directory searched for formulae requested by name.
    pub formula_dir: Option<Utf8PathBuf>,
    /// Directory holding fetched source trees.
    pub cache_dir: Utf8PathBuf,
    /// Directory receiving installed binaries.
    pub bin_dir: Utf8PathBuf,
    /// Directory receiving bash completion scripts.
    pub bash_completion_dir: Utf8PathBuf,
    /// Directory receiving zsh completion scripts.
    pub zsh_completion_dir: Utf8PathBuf,
    /// Custom bash completion template.
    pub bash_template: Option<Utf8PathBuf>,
    /// Custom zsh completion template.
    pub zsh_template: Option<Utf8PathBuf>,
    /// Prefix of installed completion filenames.
    pub completion_prefix: String,
    /// Toolchain program invoked to build tools.
    pub toolchain: String,
    /// Arguments passed to an installed tool to probe it.
    pub probe_args: Vec<String>,
    /// Fetch timeout.
    pub fetch_timeout: Option<Duration>,
    /// Build timeout per toolchain step.
    pub build_timeout: Option<Duration>,
    /// Probe timeout.
    pub probe_timeout: Option<Duration>,
    /// Maximum number of tools processed concurrently.
    pub jobs: Option<usize>,
}

impl ResolvedConfig {
    /// Completion templates for both shells, custom files taking precedence.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] if a custom template cannot be read or lacks
    /// the placeholder.
    pub fn completion_templates(
        &self,
    ) -> std::result::Result<Vec<CompletionTemplate>, InstallError> {
        ShellFamily::ALL
            .iter()
            .map(|&shell| {
                let (custom, dir) = match shell {
                    ShellFamily::Bash => (&self.bash_template, &self.bash_completion_dir),
                    ShellFamily::Zsh => (&self.zsh_template, &self.zsh_completion_dir),
                };
                match custom {
                    Some(path) => CompletionTemplate::from_file(shell, path, dir.clone()),
                    None => Ok(CompletionTemplate::bundled(shell, dir.clone())),
                }
            })
            .collect()
    }
}
