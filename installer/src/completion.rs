//! Shell-completion templates and token substitution.
//!
//! Every packaged tool ships the same two completion scripts, written once
//! with a placeholder token (conventionally the word `tool`) standing in for
//! the real tool name. Rendering replaces every occurrence of the token; the
//! pure [`render`] function keeps that step free of filesystem concerns.

use crate::installer::InstallError;
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Placeholder token used by the bundled templates.
pub const DEFAULT_PLACEHOLDER: &str = "tool";

/// Bundled bash completion template.
pub const BASH_TEMPLATE: &str = "complete -o default -C tool tool\n";

/// Bundled zsh completion template.
pub const ZSH_TEMPLATE: &str = concat!(
    "autoload bashcompinit\n",
    "bashcompinit\n",
    "complete -o default -C tool tool\n",
);

/// Shell families that receive a completion script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellFamily {
    /// GNU bash.
    Bash,
    /// Z shell.
    Zsh,
}

impl ShellFamily {
    /// All shell families in installation order.
    pub const ALL: [Self; 2] = [Self::Bash, Self::Zsh];

    /// File extension used for the installed completion script.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
        }
    }

    /// The bundled template content for this shell family.
    #[must_use]
    pub const fn bundled_template(self) -> &'static str {
        match self {
            Self::Bash => BASH_TEMPLATE,
            Self::Zsh => ZSH_TEMPLATE,
        }
    }
}

impl fmt::Display for ShellFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A completion script template bound to its install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTemplate {
    shell: ShellFamily,
    content: String,
    placeholder: String,
    install_dir: Utf8PathBuf,
}

impl CompletionTemplate {
    /// Create a template, rejecting content that lacks the placeholder.
    ///
    /// A template without its placeholder would render to itself and install
    /// a script that completes for the wrong command, so it is refused here.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::PlaceholderMissing`] if the placeholder is
    /// empty or does not occur in `content`.
    pub fn new(
        shell: ShellFamily,
        content: impl Into<String>,
        placeholder: impl Into<String>,
        install_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, InstallError> {
        let content = content.into();
        let placeholder = placeholder.into();
        if placeholder.is_empty() || !content.contains(&placeholder) {
            return Err(InstallError::PlaceholderMissing { shell, placeholder });
        }
        Ok(Self {
            shell,
            content,
            placeholder,
            install_dir: install_dir.into(),
        })
    }

    /// The bundled template for `shell`, installed into `install_dir`.
    #[must_use]
    pub fn bundled(shell: ShellFamily, install_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            shell,
            content: shell.bundled_template().to_owned(),
            placeholder: DEFAULT_PLACEHOLDER.to_owned(),
            install_dir: install_dir.into(),
        }
    }

    /// Load a template file using the default placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Io`] if the file cannot be read, or
    /// [`InstallError::PlaceholderMissing`] if it lacks the placeholder.
    pub fn from_file(
        shell: ShellFamily,
        path: &Utf8Path,
        install_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, InstallError> {
        let content = std::fs::read_to_string(path).map_err(|source| InstallError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::new(shell, content, DEFAULT_PLACEHOLDER, install_dir)
    }

    /// Shell family of this template.
    #[must_use]
    pub fn shell(&self) -> ShellFamily {
        self.shell
    }

    /// Raw template content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Placeholder token replaced at install time.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Directory the rendered script is installed into.
    #[must_use]
    pub fn install_dir(&self) -> &Utf8Path {
        &self.install_dir
    }

    /// Render the template for `name`.
    #[must_use]
    pub fn render(&self, name: &ToolName) -> String {
        render(&self.content, &self.placeholder, name.as_str())
    }
}

/// Replace every occurrence of `token` in `template` with `replacement`.
///
/// An empty token leaves the template unchanged.
///
/// # Examples
///
/// ```
/// use dgtools_installer::completion::{BASH_TEMPLATE, render};
///
/// let rendered = render(BASH_TEMPLATE, "tool", "bake");
/// assert_eq!(rendered, "complete -o default -C bake bake\n");
/// ```
#[must_use]
pub fn render(template: &str, token: &str, replacement: &str) -> String {
    if token.is_empty() {
        return template.to_owned();
    }
    template.replace(token, replacement)
}

/// Build the per-tool completion filename, `{prefix}.{name}.{extension}`.
///
/// The tool name keeps files of different tools sharing one completion
/// directory apart.
#[must_use]
pub fn completion_filename(prefix: &str, name: &ToolName, shell: ShellFamily) -> String {
    format!("{prefix}.{name}.{}", shell.extension())
}

/// The bundled bash and zsh templates bound to their install directories.
#[must_use]
pub fn bundled_templates(bash_dir: &Utf8Path, zsh_dir: &Utf8Path) -> Vec<CompletionTemplate> {
    vec![
        CompletionTemplate::bundled(ShellFamily::Bash, bash_dir),
        CompletionTemplate::bundled(ShellFamily::Zsh, zsh_dir),
    ]
}

/// Replace `defaults` with templates shipped in a fetched source tree.
///
/// For each default template, `{dir}/completions.{ext}` is used when present;
/// the install directory of the default is kept either way.
///
/// # Errors
///
/// Returns [`InstallError`] if a shipped template cannot be read or lacks the
/// placeholder.
pub fn templates_from_tree(
    dir: &Utf8Path,
    defaults: &[CompletionTemplate],
) -> Result<Vec<CompletionTemplate>, InstallError> {
    defaults
        .iter()
        .map(|default| {
            let shipped = dir.join(format!("completions.{}", default.shell.extension()));
            if shipped.is_file() {
                log::debug!("using {} completion template {shipped}", default.shell);
                CompletionTemplate::from_file(default.shell, &shipped, default.install_dir.clone())
            } else {
                Ok(default.clone())
            }
        })
        .collect()
}
