//! Formula files.
//!
//! Each tool is described by one TOML file named after it (`bake.toml`).
//! A formula directory holds any number of them. Formulae are validated as
//! they are loaded so a malformed file is reported with its path before any
//! tool is fetched.

use crate::spec::{SpecError, ToolSpec};
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// File extension of formula files.
pub const FORMULA_EXTENSION: &str = "toml";

/// Errors arising while loading formulae.
#[derive(Debug, Error)]
pub enum FormulaError {
    /// A formula file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The path being read.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A formula file is not valid TOML or has unexpected fields.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// The formula file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A formula file is not named after the tool it describes.
    #[error("{path} describes {name}; rename it to {name}.toml")]
    NameMismatch {
        /// The formula file.
        path: Utf8PathBuf,
        /// The tool named inside the file.
        name: ToolName,
    },

    /// A formula parsed but describes an invalid tool.
    #[error("{path}: {source}")]
    Invalid {
        /// The formula file.
        path: Utf8PathBuf,
        /// The validation failure.
        #[source]
        source: SpecError,
    },

    /// No formula exists for a requested name.
    #[error("no formula named {name} in {dir}")]
    NotFound {
        /// The requested name.
        name: String,
        /// The directory that was searched.
        dir: Utf8PathBuf,
    },

    /// A formula was requested by name without a directory to look in.
    #[error("formula {name} requested by name but no formula directory is configured")]
    NoDirectory {
        /// The requested name.
        name: String,
    },
}

/// Parse and validate formula text.
///
/// # Errors
///
/// Returns [`FormulaError::Parse`] or [`FormulaError::Invalid`].
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use dgtools_installer::formula::parse_formula;
///
/// let spec = parse_formula(
///     r#"
/// name = "tz"
/// description = "Show time zones based on user defined groups"
/// source_path = "tz"
///
/// [source]
/// url = "https://github.com/DavidGamba/dgtools/archive/refs/tags/tz/v0.1.0.tar.gz"
/// sha256 = "1ffaae8225ef3d7e3fdcf61348d2fb2b100bcd959cfaeed5ddeef7038c844786"
/// "#,
///     Utf8Path::new("tz.toml"),
/// )
/// .expect("valid formula");
/// assert_eq!(spec.name.as_str(), "tz");
/// ```
pub fn parse_formula(source: &str, origin: &Utf8Path) -> Result<ToolSpec, FormulaError> {
    let spec: ToolSpec = toml::from_str(source).map_err(|e| FormulaError::Parse {
        path: origin.to_owned(),
        reason: e.to_string(),
    })?;
    spec.validate().map_err(|source| FormulaError::Invalid {
        path: origin.to_owned(),
        source,
    })?;
    Ok(spec)
}

/// Load one formula file.
///
/// # Errors
///
/// Returns a [`FormulaError`] if the file cannot be read, does not parse,
/// is invalid, or is not named after its tool.
pub fn load_formula(path: &Utf8Path) -> Result<ToolSpec, FormulaError> {
    let source = std::fs::read_to_string(path).map_err(|source| FormulaError::Read {
        path: path.to_owned(),
        source,
    })?;
    let spec = parse_formula(&source, path)?;

    if path.file_stem() != Some(spec.name.as_str()) {
        return Err(FormulaError::NameMismatch {
            path: path.to_owned(),
            name: spec.name,
        });
    }

    log::trace!("loaded formula {} from {path}", spec.name);
    Ok(spec)
}

/// Load every formula in `dir`, ordered by file name.
///
/// Files without the `.toml` extension are ignored.
///
/// # Errors
///
/// Returns a [`FormulaError`] for the first file that fails to load.
pub fn load_formula_dir(dir: &Utf8Path) -> Result<Vec<ToolSpec>, FormulaError> {
    let read_error = |source| FormulaError::Read {
        path: dir.to_owned(),
        source,
    };

    let mut paths = Vec::new();
    for entry in dir.read_dir_utf8().map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let path = entry.path();
        if path.extension() == Some(FORMULA_EXTENSION) && path.is_file() {
            paths.push(path.to_owned());
        }
    }
    paths.sort();

    paths.iter().map(|path| load_formula(path)).collect()
}

/// Resolve formula requests into descriptors.
///
/// A request naming a `.toml` file or containing a path separator is loaded
/// as a path; anything else is looked up as `{dir}/{request}.toml`. With
/// `all`, every formula in `dir` is loaded and appended.
///
/// # Errors
///
/// Returns a [`FormulaError`] if a request cannot be resolved or loaded.
pub fn resolve_formulae(
    requests: &[String],
    dir: Option<&Utf8Path>,
    all: bool,
) -> Result<Vec<ToolSpec>, FormulaError> {
    let mut specs = Vec::new();

    for request in requests {
        let spec = if is_path_request(request) {
            load_formula(Utf8Path::new(request))?
        } else {
            let Some(dir) = dir else {
                return Err(FormulaError::NoDirectory {
                    name: request.clone(),
                });
            };
            let path = dir.join(format!("{request}.{FORMULA_EXTENSION}"));
            if !path.is_file() {
                return Err(FormulaError::NotFound {
                    name: request.clone(),
                    dir: dir.to_owned(),
                });
            }
            load_formula(&path)?
        };
        specs.push(spec);
    }

    if all {
        let Some(dir) = dir else {
            return Err(FormulaError::NoDirectory {
                name: "--all".to_owned(),
            });
        };
        specs.extend(load_formula_dir(dir)?);
    }

    Ok(specs)
}

fn is_path_request(request: &str) -> bool {
    request.ends_with(&format!(".{FORMULA_EXTENSION}")) || request.contains(['/', '\\'])
}
