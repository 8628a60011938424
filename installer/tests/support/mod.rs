//! Test support utilities for installer behavioural tests.
//!
//! Provides a sandbox with isolated target directories, a fake Go toolchain
//! and an archive "server" backed by local files, so the real fetch, build,
//! install and verify stages can run end to end without network access.

#![cfg(unix)]
#![allow(dead_code, reason = "each behaviour suite uses a subset")]

use camino::{Utf8Path, Utf8PathBuf};
use dgtools_installer::builder::{BuildConfig, Builder};
use dgtools_installer::completion::{CompletionTemplate, bundled_templates};
use dgtools_installer::fetch::download::{ArchiveDownloader, DownloadError};
use dgtools_installer::fetch::extraction::TarGzExtractor;
use dgtools_installer::fetch::{FetchConfig, Fetcher};
use dgtools_installer::installer::Installer;
use dgtools_installer::pipeline::PackagingEngine;
use dgtools_installer::sha256_digest::{Sha256Digest, compute_sha256};
use dgtools_installer::spec::ToolSpec;
use dgtools_installer::test_utils::{copying_go, help_tool_script, write_script, write_tar_gz};
use dgtools_installer::verifier::Verifier;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// File in each published source directory that the fake toolchain installs
/// as the built executable.
pub const TOOL_SCRIPT: &str = "tool.sh";

/// Serves archives from local files keyed by URL.
pub struct LocalDownloader {
    archives: HashMap<String, PathBuf>,
    downloads: Arc<AtomicUsize>,
}

impl ArchiveDownloader for LocalDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let Some(source) = self.archives.get(url) else {
            return Err(DownloadError::NotFound {
                url: url.to_owned(),
            });
        };
        self.downloads.fetch_add(1, Ordering::SeqCst);
        std::fs::copy(source, dest)?;
        Ok(())
    }
}

/// Isolated directories for one scenario.
pub struct Sandbox {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub bin_dir: Utf8PathBuf,
    pub bash_dir: Utf8PathBuf,
    pub zsh_dir: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
    archives: HashMap<String, PathBuf>,
    downloads: Arc<AtomicUsize>,
}

impl Sandbox {
    /// Create empty target directories under a fresh temporary root.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8 temp dir");
        Self {
            bin_dir: root.join("bin"),
            bash_dir: root.join("share/bash-completion/completions"),
            zsh_dir: root.join("share/zsh/site-functions"),
            cache_dir: root.join("cache"),
            root,
            _temp: temp,
            archives: HashMap::new(),
            downloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish a source archive for `name`.
    ///
    /// The archive mimics a GitHub tag archive: one top-level directory
    /// holding the tool's source directory. With `tool_script`, building the
    /// source yields that script; without it the build fails.
    pub fn publish(&mut self, name: &str, tool_script: Option<&str>) -> (String, Sha256Digest) {
        let archives = self.root.join("archives");
        std::fs::create_dir_all(&archives).expect("archives dir");
        let path = archives.join(format!("{name}.tar.gz"));

        let main = format!("dgtools-{name}/{name}/main.go");
        let script = format!("dgtools-{name}/{name}/{TOOL_SCRIPT}");
        let mut files = vec![(main.as_str(), "package main\n")];
        if let Some(body) = tool_script {
            files.push((script.as_str(), body));
        }
        write_tar_gz(path.as_std_path(), &files);

        let url = format!("https://archives.test/{name}.tar.gz");
        let digest = compute_sha256(path.as_std_path()).expect("hash archive");
        self.archives.insert(url.clone(), path.into_std_path_buf());
        (url, digest)
    }

    /// Publish an archive for `name` and return a descriptor pinned to it.
    pub fn pinned_spec(&mut self, name: &str) -> ToolSpec {
        let (url, digest) = self.publish(name, Some(&help_tool_script(name)));
        ToolSpec::archive(name, &url, Some(digest))
    }

    /// Number of archives downloaded so far.
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Bundled completion templates targeting the sandbox directories.
    pub fn templates(&self) -> Vec<CompletionTemplate> {
        bundled_templates(&self.bash_dir, &self.zsh_dir)
    }

    /// Assemble an engine whose toolchain "builds" each tool by copying the
    /// [`TOOL_SCRIPT`] shipped in its source directory.
    pub fn engine(&self) -> PackagingEngine {
        let go = self.root.join("toolchain/go");
        write_script(go.as_std_path(), &copying_go(TOOL_SCRIPT));

        let downloader = LocalDownloader {
            archives: self.archives.clone(),
            downloads: Arc::clone(&self.downloads),
        };
        let fetcher = Fetcher::with_parts(
            FetchConfig {
                cache_dir: self.cache_dir.clone(),
                timeout: Some(Duration::from_secs(30)),
            },
            Box::new(downloader),
            Box::new(TarGzExtractor),
        );
        PackagingEngine::with_stages(
            Box::new(fetcher),
            Box::new(Builder::new(BuildConfig {
                toolchain: go.into_string(),
                timeout: Some(Duration::from_secs(30)),
                verbose: false,
            })),
            Box::new(Installer::new(self.bin_dir.clone(), "dgtools")),
            Box::new(Verifier::new(
                vec!["--help".to_owned()],
                Some(Duration::from_secs(10)),
            )),
        )
    }

    /// Contents of a file under the sandbox, or `None` when absent.
    pub fn read(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        std::fs::read(path).ok()
    }
}
