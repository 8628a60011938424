//! Semantic wrapper for packaged tool names.
//!
//! This module provides the [`ToolName`] newtype for type-safe handling of
//! tool names throughout the installer. A tool name is substituted verbatim
//! into file paths and completion script contents, so the accepted alphabet is
//! deliberately narrow.

use crate::spec::SpecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters permitted in a tool name besides ASCII alphanumerics.
const EXTRA_NAME_CHARS: &[char] = &['-', '_', '.'];

/// A semantic name for a packaged tool.
///
/// This newtype wrapper provides type safety for tool names, ensuring they are
/// passed explicitly rather than as raw strings. Validation is performed by
/// [`validate_tool_name`], not by this type itself, so that descriptors can be
/// parsed first and rejected with a precise error afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ToolName(String);

impl ToolName {
    /// Create a new tool name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the tool name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ToolName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ToolName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate that a tool name is a safe substitution token.
///
/// Accepted names are non-empty, made of ASCII alphanumerics plus `-`, `_`
/// and `.`, and do not start with `-` or `.`. This rules out path separators,
/// shell metacharacters, whitespace, `..` and option-like names.
///
/// # Errors
///
/// Returns [`SpecError::EmptyName`] or [`SpecError::InvalidName`] describing
/// the first violation found.
///
/// # Examples
///
/// ```
/// use dgtools_installer::tool_name::{ToolName, validate_tool_name};
///
/// assert!(validate_tool_name(&ToolName::from("password-cache")).is_ok());
/// assert!(validate_tool_name(&ToolName::from("rm -rf")).is_err());
/// ```
pub fn validate_tool_name(name: &ToolName) -> Result<(), SpecError> {
    let value = name.as_str();
    let Some(first) = value.chars().next() else {
        return Err(SpecError::EmptyName);
    };

    if first == '-' || first == '.' {
        return Err(SpecError::InvalidName {
            name: name.clone(),
            reason: format!("must not start with '{first}'"),
        });
    }

    if let Some(bad) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !EXTRA_NAME_CHARS.contains(c))
    {
        return Err(SpecError::InvalidName {
            name: name.clone(),
            reason: format!("character {bad:?} is not allowed"),
        });
    }

    Ok(())
}
