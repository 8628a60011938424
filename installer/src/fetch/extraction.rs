//! Source archive extraction.
//!
//! Extracts `.tar.gz` archives to a target directory with path traversal
//! protection to prevent zip-slip attacks.

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use std::path::{Component, Path};

/// Trait for extracting source archives, enabling test mocking.
///
/// # Examples
///
/// ```
/// use dgtools_installer::fetch::extraction::TarGzExtractor;
///
/// let extractor = TarGzExtractor;
/// // Use extractor.extract(archive_path, dest_dir) in production
/// # let _ = extractor;
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the number of regular files extracted.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
    /// escape the destination directory, [`ExtractionError::EmptyArchive`]
    /// if no files are found, and [`ExtractionError::Io`] on I/O failures.
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no files.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// Default extractor using the `tar` and `flate2` crates.
///
/// Validates each entry path and link target before extraction, and unpacks
/// through [`tar::Entry::unpack_in`] so nothing is written through a link
/// that leaves the destination (zip-slip).
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<usize, ExtractionError> {
        let file = std::fs::File::open(archive_path)?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut files = 0;

        for entry_result in archive.entries()? {
            let mut entry = entry_result?;
            let entry_path = entry.path()?.into_owned();

            validate_entry_path(&entry_path)?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry.link_name()?.unwrap_or_default().into_owned();
                validate_link_target(&entry_path, &target, entry_type.is_symlink())?;
            }

            if !entry.unpack_in(dest_dir)? {
                return Err(ExtractionError::PathTraversal {
                    path: entry_path.display().to_string(),
                });
            }

            if entry_type.is_file() {
                files += 1;
            }
        }

        if files == 0 {
            return Err(ExtractionError::EmptyArchive);
        }

        Ok(files)
    }
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Validate that a link entry resolves inside the destination directory.
///
/// Symlink targets are relative to the link's own directory; hard link
/// targets are relative to the archive root.
fn validate_link_target(
    entry_path: &Path,
    target: &Path,
    is_symlink: bool,
) -> Result<(), ExtractionError> {
    let base = match entry_path.parent() {
        Some(parent) if is_symlink => parent,
        _ => Path::new(""),
    };

    let mut depth = 0_usize;
    for component in base.components().chain(target.components()) {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::PathTraversal {
                    path: format!("{} -> {}", entry_path.display(), target.display()),
                });
            }
        }
    }
    Ok(())
}

/// The repository root inside an extracted archive.
///
/// GitHub tag archives wrap the repository in one top-level directory
/// (`dgtools-bake-v0.1.0/`). When `dir` holds exactly one entry and it is a
/// directory, that directory is the root; otherwise `dir` itself is.
///
/// # Errors
///
/// Returns an I/O error if `dir` cannot be listed.
pub fn source_root(dir: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
    let mut entries = dir.read_dir_utf8()?;
    let first = entries.next().transpose()?;
    let second = entries.next().transpose()?;
    match (first, second) {
        (Some(only), None) if only.file_type()?.is_dir() => Ok(only.path().to_owned()),
        _ => Ok(dir.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_tar_gz;
    use rstest::rstest;
    use std::path::PathBuf;

    #[test]
    fn extract_real_archive() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let archive_path = temp_dir.path().join("tz.tar.gz");
        let dest_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&dest_dir).expect("create dest");
        write_tar_gz(
            &archive_path,
            &[("dgtools-tz-v0.1.0/tz/main.go", "package main\n")],
        );

        let files = TarGzExtractor
            .extract(&archive_path, &dest_dir)
            .expect("extract");

        assert_eq!(files, 1);
        assert!(dest_dir.join("dgtools-tz-v0.1.0/tz/main.go").exists());
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let path = PathBuf::from(bad_path);
        let result = validate_entry_path(&path);
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[test]
    fn accepts_normal_paths() {
        let path = PathBuf::from("dgtools-bake-v0.1.0/bake/main.go");
        assert!(validate_entry_path(&path).is_ok());
    }

    #[test]
    fn rejects_absolute_path() {
        let path = PathBuf::from("/etc/passwd");
        let result = validate_entry_path(&path);
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
    }

    fn write_linked_archive(path: &Path, link: &str, target: &Path, files: &[(&str, &str)]) {
        let file = std::fs::File::create(path).expect("create archive");
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        header.set_mtime(0);
        builder
            .append_link(&mut header, link, target)
            .expect("append link");

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            builder
                .append_data(&mut header, name, content.as_bytes())
                .expect("append file");
        }
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    #[test]
    fn symlink_leaving_destination_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir_all(&outside).expect("create outside");
        let dest_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&dest_dir).expect("create dest");
        let archive_path = temp_dir.path().join("linked.tar.gz");
        write_linked_archive(
            &archive_path,
            "link",
            &outside,
            &[("link/escaped.txt", "escaped\n")],
        );

        let result = TarGzExtractor.extract(&archive_path, &dest_dir);

        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal, got {result:?}"
        );
        assert!(!outside.join("escaped.txt").exists());
    }

    #[rstest]
    #[case::parent_of_root("link", "../outside", true)]
    #[case::nested_climb("repo/docs/link", "../../../etc", true)]
    #[case::absolute("link", "/etc", true)]
    #[case::hard_link_climb("repo/link", "../x", false)]
    fn escaping_link_targets_are_rejected(
        #[case] entry: &str,
        #[case] target: &str,
        #[case] is_symlink: bool,
    ) {
        let result = validate_link_target(Path::new(entry), Path::new(target), is_symlink);
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_the_tree_is_extracted() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let dest_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&dest_dir).expect("create dest");
        let archive_path = temp_dir.path().join("linked.tar.gz");
        write_linked_archive(
            &archive_path,
            "dgtools-bt-v0.1.0/bt/README.md",
            Path::new("../README.md"),
            &[("dgtools-bt-v0.1.0/README.md", "# dgtools\n")],
        );

        let files = TarGzExtractor
            .extract(&archive_path, &dest_dir)
            .expect("extract");

        assert_eq!(files, 1);
        let linked = dest_dir.join("dgtools-bt-v0.1.0/bt/README.md");
        assert!(std::fs::symlink_metadata(&linked).is_ok());
    }

    #[test]
    fn extract_empty_archive() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let archive_path = temp_dir.path().join("empty.tar.gz");
        let dest_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&dest_dir).expect("create dest");
        write_tar_gz(&archive_path, &[]);

        let result = TarGzExtractor.extract(&archive_path, &dest_dir);
        assert!(matches!(result, Err(ExtractionError::EmptyArchive)));
    }

    #[test]
    fn source_root_strips_single_top_level_directory() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).expect("utf8");
        std::fs::create_dir_all(root.join("dgtools-bake-v0.1.0/bake")).expect("mkdir");

        let resolved = source_root(&root).expect("source root");
        assert_eq!(resolved, root.join("dgtools-bake-v0.1.0"));
    }

    #[test]
    fn source_root_keeps_flat_layout() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).expect("utf8");
        std::fs::create_dir_all(root.join("bake")).expect("mkdir");
        std::fs::write(root.join("go.mod"), "module x\n").expect("write");

        let resolved = source_root(&root).expect("source root");
        assert_eq!(resolved, root);
    }
}
