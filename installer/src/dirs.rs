//! Directory resolution abstraction for platform-specific paths.
//!
//! The installer needs a handful of per-user base directories to derive its
//! default targets. [`BaseDirs`] lets tests substitute fixed locations.

use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Provides platform base directories.
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<Utf8PathBuf>;

    /// Directory for user executables (usually `~/.local/bin`).
    fn bin_dir(&self) -> Option<Utf8PathBuf>;

    /// Per-user local data directory (usually `~/.local/share`).
    fn data_local_dir(&self) -> Option<Utf8PathBuf>;

    /// Per-user cache directory (usually `~/.cache`).
    fn cache_dir(&self) -> Option<Utf8PathBuf>;

    /// Per-user configuration directory (usually `~/.config`).
    fn config_dir(&self) -> Option<Utf8PathBuf>;
}

/// Base directories of the current user, via `directories-next`.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    inner: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Resolve the current user's base directories.
    ///
    /// Returns `None` when no home directory can be determined.
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|inner| Self { inner })
    }
}

fn utf8(path: PathBuf) -> Option<Utf8PathBuf> {
    Utf8PathBuf::try_from(path).ok()
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<Utf8PathBuf> {
        utf8(self.inner.home_dir().to_path_buf())
    }

    fn bin_dir(&self) -> Option<Utf8PathBuf> {
        self.inner
            .executable_dir()
            .and_then(|dir| utf8(dir.to_path_buf()))
            .or_else(|| self.home_dir().map(|home| home.join(".local").join("bin")))
    }

    fn data_local_dir(&self) -> Option<Utf8PathBuf> {
        utf8(self.inner.data_local_dir().to_path_buf())
    }

    fn cache_dir(&self) -> Option<Utf8PathBuf> {
        utf8(self.inner.cache_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<Utf8PathBuf> {
        utf8(self.inner.config_dir().to_path_buf())
    }
}

/// Fixed base directories rooted under one path.
///
/// Used by tests and by `--prefix`-style invocations where every target lives
/// under a single root.
#[derive(Debug, Clone)]
pub struct RootedBaseDirs {
    root: Utf8PathBuf,
}

impl RootedBaseDirs {
    /// Create base directories rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BaseDirs for RootedBaseDirs {
    fn home_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.root.clone())
    }

    fn bin_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.root.join("bin"))
    }

    fn data_local_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.root.join("share"))
    }

    fn cache_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.root.join("cache"))
    }

    fn config_dir(&self) -> Option<Utf8PathBuf> {
        Some(self.root.join("config"))
    }
}
