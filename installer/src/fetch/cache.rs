//! On-disk fetch cache.
//!
//! Each fetched source lives in its own entry directory:
//!
//! ```text
//! {cache_dir}/{name}/{sha256}/tree/      extracted archive
//! {cache_dir}/{name}/{sha256}/.fetched   completion marker, holds the digest
//! {cache_dir}/{name}/live-{branch}/      git checkout of a live ref
//! ```
//!
//! The marker is written last. An archive entry without a matching marker is
//! an interrupted fetch and is discarded before reuse.

use crate::sha256_digest::Sha256Digest;
use crate::tool_name::ToolName;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Marker file written once an archive entry is complete.
pub const MARKER_FILE: &str = ".fetched";

/// Directory holding the extracted tree within an archive entry.
pub const TREE_DIR: &str = "tree";

/// A cache entry for one fetched archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    dir: Utf8PathBuf,
    digest: Sha256Digest,
}

impl CacheEntry {
    /// The entry for `name` at `digest` under `cache_dir`.
    #[must_use]
    pub fn archive(cache_dir: &Utf8Path, name: &ToolName, digest: &Sha256Digest) -> Self {
        Self {
            dir: tool_dir(cache_dir, name).join(digest.as_str()),
            digest: digest.clone(),
        }
    }

    /// Entry directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Directory holding the extracted archive.
    #[must_use]
    pub fn tree(&self) -> Utf8PathBuf {
        self.dir.join(TREE_DIR)
    }

    /// Whether the entry was completed for this digest.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        fs::read_to_string(self.dir.join(MARKER_FILE))
            .is_ok_and(|recorded| recorded.trim() == self.digest.as_str())
            && self.tree().is_dir()
    }

    /// Remove whatever is at the entry directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory exists but cannot be removed.
    pub fn discard(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Move an extracted tree into the entry and write the marker.
    ///
    /// Any previous content of the entry is discarded first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be moved or the marker cannot
    /// be written.
    pub fn commit(&self, extracted: &Utf8Path) -> io::Result<()> {
        self.discard()?;
        fs::create_dir_all(&self.dir)?;
        fs::rename(extracted, self.tree())?;
        fs::write(self.dir.join(MARKER_FILE), format!("{}\n", self.digest))
    }
}

/// Per-tool directory under `cache_dir`.
#[must_use]
pub fn tool_dir(cache_dir: &Utf8Path, name: &ToolName) -> Utf8PathBuf {
    cache_dir.join(name.as_str())
}

/// Checkout directory for a live ref of `name` on `branch`.
///
/// Path separators in branch names are flattened so every branch maps to a
/// single directory.
#[must_use]
pub fn live_dir(cache_dir: &Utf8Path, name: &ToolName, branch: &str) -> Utf8PathBuf {
    let flattened: String = branch
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    tool_dir(cache_dir, name).join(format!("live-{flattened}"))
}
