//! CLI argument definitions for the dgtools installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::completion::ShellFamily;
use crate::config::EngineConfig;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Fetch, build and install dgtools command-line tools.
#[derive(Parser, Debug)]
#[command(name = "dgtools-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, build and install dgtools command-line tools.\n\n",
    "Each tool is described by a formula: a small TOML file naming its source ",
    "archive (pinned by SHA-256) or git branch, the directory to build, and ",
    "any build environment. The installer downloads and verifies the source, ",
    "builds it with the Go toolchain, installs the binary together with bash ",
    "and zsh completion scripts, and then runs the tool once to check that it ",
    "starts.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install two tools from a formula directory:\n",
    "    $ dgtools-installer install --formula-dir formulae bake tz\n\n",
    "  Install every formula, four at a time:\n",
    "    $ dgtools-installer install --formula-dir formulae --all --jobs 4\n\n",
    "  Check formulae without fetching anything:\n",
    "    $ dgtools-installer check --formula-dir formulae --all\n\n",
    "  Smoke-test installed tools:\n",
    "    $ dgtools-installer verify --formula-dir formulae bt kdecode\n\n",
    "  Print the zsh completion for bake:\n",
    "    $ dgtools-installer completion bake --shell zsh\n\n",
    "For more information, see: https://github.com/DavidGamba/dgtools",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch, build, install and verify tools.
    Install(InstallArgs),

    /// Validate formulae without touching the network or filesystem targets.
    Check(SelectArgs),

    /// Probe already-installed tools.
    Verify(VerifyArgs),

    /// Print the rendered completion script for a tool.
    Completion(CompletionArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file [default: ~/.config/dgtools/installer.toml].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Formula selection.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Formula names, or paths to formula files.
    #[arg(value_name = "FORMULA", required_unless_present = "all")]
    pub formulae: Vec<String>,

    /// Select every formula in the formula directory.
    #[arg(long)]
    pub all: bool,

    /// Directory holding `<name>.toml` formula files.
    #[arg(long, value_name = "DIR")]
    pub formula_dir: Option<Utf8PathBuf>,
}

/// Target directory overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    /// Directory receiving tool binaries [default: ~/.local/bin].
    #[arg(long, value_name = "DIR")]
    pub bin_dir: Option<Utf8PathBuf>,

    /// Directory receiving bash completions.
    #[arg(long, value_name = "DIR")]
    pub bash_completion_dir: Option<Utf8PathBuf>,

    /// Directory receiving zsh completions.
    #[arg(long, value_name = "DIR")]
    pub zsh_completion_dir: Option<Utf8PathBuf>,

    /// Download and checkout cache [default: ~/.cache/dgtools].
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Formula selection.
    #[command(flatten)]
    pub select: SelectArgs,

    /// Target directory overrides.
    #[command(flatten)]
    pub locations: LocationArgs,

    /// Maximum number of tools processed at once [default: all].
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(usize))]
    pub jobs: Option<usize>,

    /// Write a JSON report to stdout.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the verify command.
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Formula selection.
    #[command(flatten)]
    pub select: SelectArgs,

    /// Directory holding the installed binaries [default: ~/.local/bin].
    #[arg(long, value_name = "DIR")]
    pub bin_dir: Option<Utf8PathBuf>,
}

/// Arguments for the completion command.
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Tool name substituted into the template.
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Shell family of the template.
    #[arg(long, value_enum)]
    pub shell: ShellFamily,
}

impl SelectArgs {
    /// Copy the formula directory override onto `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(dir) = &self.formula_dir {
            config.formula_dir = Some(dir.clone());
        }
    }
}

impl LocationArgs {
    /// Copy every directory override onto `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use dgtools_installer::cli::LocationArgs;
    /// use dgtools_installer::config::EngineConfig;
    ///
    /// let args = LocationArgs {
    ///     bin_dir: Some(Utf8PathBuf::from("/opt/bin")),
    ///     ..LocationArgs::default()
    /// };
    /// let mut config = EngineConfig::default();
    /// args.apply(&mut config);
    /// assert_eq!(config.bin_dir, Some(Utf8PathBuf::from("/opt/bin")));
    /// ```
    pub fn apply(&self, config: &mut EngineConfig) {
        let overrides = [
            (&self.bin_dir, &mut config.bin_dir),
            (&self.bash_completion_dir, &mut config.bash_completion_dir),
            (&self.zsh_completion_dir, &mut config.zsh_completion_dir),
            (&self.cache_dir, &mut config.cache_dir),
        ];
        for (value, slot) in overrides {
            if let Some(dir) = value {
                *slot = Some(dir.clone());
            }
        }
    }
}

impl InstallArgs {
    /// Copy every override carried by the install arguments onto `config`.
    pub fn apply(&self, config: &mut EngineConfig) {
        self.select.apply(config);
        self.locations.apply(config);
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
    }
}

impl GlobalArgs {
    /// Default log filter for the requested verbosity.
    ///
    /// `RUST_LOG` still takes precedence when set.
    #[must_use]
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
