//! Source retrieval for tool descriptors.
//!
//! A versioned archive is downloaded, hashed and compared against the
//! declared digest before it is extracted into the cache; that comparison is
//! the only integrity gate and everything downstream trusts the tree. A live
//! ref is cloned or updated with git and carries no checksum, so its tree is
//! marked [`Trust::Unverified`].

pub mod cache;
pub mod download;
pub mod extraction;
pub mod git;

use crate::sha256_digest::{Sha256Digest, compute_sha256};
use crate::spec::{ArchiveSource, LiveSource, SourceRef, ToolSpec};
use crate::tool_name::ToolName;
use cache::CacheEntry;
use camino::{Utf8Path, Utf8PathBuf};
use download::{ArchiveDownloader, DownloadError, HttpDownloader};
use extraction::{ArchiveExtractor, ExtractionError, TarGzExtractor, source_root};
use serde::Serialize;
use std::time::Duration;

/// File name of the downloaded archive inside a staging directory.
const ARCHIVE_FILE: &str = "source.tar.gz";

/// Whether a fetched tree passed an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    /// The archive matched its declared SHA-256 digest.
    Verified,
    /// No digest was available to check against.
    Unverified,
}

/// A local source tree ready to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    /// Repository root of the fetched source.
    pub root: Utf8PathBuf,
    /// Integrity status of the tree.
    pub trust: Trust,
    /// Whether the tree was served from the cache without downloading.
    pub cache_hit: bool,
}

/// Errors arising while fetching a tool's source.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The descriptor has no source reference.
    #[error("{tool} has no source reference")]
    MissingSource {
        /// The tool being fetched.
        tool: ToolName,
    },

    /// The downloaded archive does not match its declared digest.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The archive URL.
        url: String,
        /// The declared digest.
        expected: Sha256Digest,
        /// The digest of the downloaded bytes.
        actual: Sha256Digest,
    },

    /// An operation did not finish within the fetch timeout.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout {
        /// What was being done.
        operation: String,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The archive URL returned 404.
    #[error("source archive not found: {url}")]
    NotFound {
        /// The URL that was requested.
        url: String,
    },

    /// The HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// The archive could not be extracted.
    #[error("failed to extract {url}: {source}")]
    Extraction {
        /// The archive URL.
        url: String,
        /// The extraction failure.
        #[source]
        source: ExtractionError,
    },

    /// A git operation failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git subcommand that failed.
        operation: &'static str,
        /// Captured stderr or a description of the failure.
        message: String,
    },

    /// A cache file operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a descriptor's source reference into a local tree.
#[cfg_attr(test, mockall::automock)]
pub trait Fetch {
    /// Fetch the source of `spec`.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the source cannot be retrieved or fails
    /// its integrity check.
    fn fetch(&self, spec: &ToolSpec) -> Result<SourceTree, FetchError>;
}

/// Settings for a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Root of the fetch cache.
    pub cache_dir: Utf8PathBuf,
    /// Limit for each download or git operation.
    pub timeout: Option<Duration>,
}

/// Fetches archives over HTTP and live refs with git, through a cache.
pub struct Fetcher {
    config: FetchConfig,
    downloader: Box<dyn ArchiveDownloader + Send + Sync>,
    extractor: Box<dyn ArchiveExtractor + Send + Sync>,
}

impl Fetcher {
    /// Create a fetcher using HTTP downloads and tar.gz extraction.
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        let downloader = HttpDownloader::new(config.timeout);
        Self::with_parts(config, Box::new(downloader), Box::new(TarGzExtractor))
    }

    /// Create a fetcher with custom download and extraction backends.
    #[must_use]
    pub fn with_parts(
        config: FetchConfig,
        downloader: Box<dyn ArchiveDownloader + Send + Sync>,
        extractor: Box<dyn ArchiveExtractor + Send + Sync>,
    ) -> Self {
        Self {
            config,
            downloader,
            extractor,
        }
    }

    /// Root of the fetch cache.
    #[must_use]
    pub fn cache_dir(&self) -> &Utf8Path {
        &self.config.cache_dir
    }

    fn fetch_archive(
        &self,
        name: &ToolName,
        source: &ArchiveSource,
    ) -> Result<SourceTree, FetchError> {
        if let Some(expected) = &source.sha256 {
            let entry = CacheEntry::archive(&self.config.cache_dir, name, expected);
            if entry.is_complete() {
                log::info!("{name}: using cached source {expected}");
                return tree_in(&entry, Trust::Verified, true);
            }
        }

        let tool_dir = cache::tool_dir(&self.config.cache_dir, name);
        std::fs::create_dir_all(&tool_dir).map_err(|e| io_error(&tool_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&tool_dir)
            .map_err(|e| io_error(&tool_dir, e))?;
        let staging_dir = Utf8PathBuf::try_from(staging.path().to_path_buf())
            .map_err(|e| io_error(&tool_dir, e.into_io_error()))?;

        let archive = staging_dir.join(ARCHIVE_FILE);
        self.downloader
            .download(&source.url, archive.as_std_path())
            .map_err(|e| self.download_failure(&source.url, e))?;

        let actual = compute_sha256(archive.as_std_path()).map_err(|e| io_error(&archive, e))?;
        let trust = match &source.sha256 {
            Some(expected) if *expected != actual => {
                return Err(FetchError::ChecksumMismatch {
                    url: source.url.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            Some(_) => Trust::Verified,
            None => {
                log::warn!(
                    "{name}: no sha256 declared for {}; source is not verified (got {actual})",
                    source.url
                );
                Trust::Unverified
            }
        };

        let entry = CacheEntry::archive(&self.config.cache_dir, name, &actual);
        if trust == Trust::Unverified && entry.is_complete() {
            return tree_in(&entry, trust, false);
        }

        let extracted = staging_dir.join(cache::TREE_DIR);
        std::fs::create_dir_all(&extracted).map_err(|e| io_error(&extracted, e))?;
        self.extractor
            .extract(archive.as_std_path(), extracted.as_std_path())
            .map_err(|source_err| FetchError::Extraction {
                url: source.url.clone(),
                source: source_err,
            })?;
        entry
            .commit(&extracted)
            .map_err(|e| io_error(entry.dir(), e))?;
        log::debug!("{name}: cached source at {}", entry.dir());

        tree_in(&entry, trust, false)
    }

    fn fetch_live(&self, name: &ToolName, source: &LiveSource) -> Result<SourceTree, FetchError> {
        let dir = cache::live_dir(&self.config.cache_dir, name, &source.branch);
        let cache_hit = git::is_checkout(&dir);

        if cache_hit {
            log::debug!("{name}: updating {} in {dir}", source.branch);
            git::update_branch(&dir, &source.branch, self.config.timeout)?;
        } else {
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
            }
            log::debug!("{name}: cloning {}@{} into {dir}", source.repository, source.branch);
            git::clone_branch(&source.repository, &source.branch, &dir, self.config.timeout)?;
        }

        log::warn!(
            "{name}: building from live branch {} of {}; source is not checksum-verified",
            source.branch,
            source.repository
        );
        Ok(SourceTree {
            root: dir,
            trust: Trust::Unverified,
            cache_hit,
        })
    }

    fn download_failure(&self, url: &str, err: DownloadError) -> FetchError {
        match err {
            DownloadError::NotFound { url } => FetchError::NotFound { url },
            DownloadError::HttpError { url, reason } => FetchError::Http { url, reason },
            DownloadError::Timeout { url } => FetchError::Timeout {
                operation: format!("download of {url}"),
                timeout_secs: self.config.timeout.map_or(0, |t| t.as_secs()),
            },
            DownloadError::Io(source) => FetchError::Http {
                url: url.to_owned(),
                reason: source.to_string(),
            },
        }
    }
}

impl Fetch for Fetcher {
    fn fetch(&self, spec: &ToolSpec) -> Result<SourceTree, FetchError> {
        match &spec.source_ref {
            Some(SourceRef::VersionedArchive(source)) => self.fetch_archive(&spec.name, source),
            Some(SourceRef::LiveRef(source)) => self.fetch_live(&spec.name, source),
            None => Err(FetchError::MissingSource {
                tool: spec.name.clone(),
            }),
        }
    }
}

fn tree_in(entry: &CacheEntry, trust: Trust, cache_hit: bool) -> Result<SourceTree, FetchError> {
    let tree = entry.tree();
    let root = source_root(&tree).map_err(|e| io_error(&tree, e))?;
    Ok(SourceTree {
        root,
        trust,
        cache_hit,
    })
}

fn io_error(path: &Utf8Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_owned(),
        source,
    }
}
