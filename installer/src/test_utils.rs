//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour suites under `tests/`.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use std::process::ExitStatus;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Writes a gzip-compressed tarball containing `files` to `path`.
///
/// Each entry is a `(path inside the archive, content)` pair. Headers use a
/// fixed mtime so identical inputs give byte-identical archives.
///
/// # Panics
///
/// Panics if the archive cannot be written.
#[expect(clippy::expect_used, reason = "test helper")]
pub fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("create archive");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .expect("append entry");
    }

    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("finish archive");
}

/// Writes an executable shell script to `path`.
///
/// # Panics
///
/// Panics if the script cannot be written or made executable.
#[cfg(unix)]
#[expect(clippy::expect_used, reason = "test helper")]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create script dir");
    }
    std::fs::write(path, body).expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod script");
}

/// A stand-in for the `go` toolchain.
///
/// `go get` succeeds without doing anything. `go build [-v] -o OUT` writes
/// `tool_script` to `OUT` and marks it executable, so the "built" tool is a
/// shell script.
#[must_use]
pub fn fake_go(tool_script: &str) -> String {
    go_script(&format!(
        "    cat > \"$out\" <<'DGTOOLS_EOF'\n{tool_script}DGTOOLS_EOF\n"
    ))
}

/// A stand-in for the `go` toolchain that "builds" by copying `file` from
/// the source directory to the output path.
///
/// A source directory without `file` makes the build fail with the error
/// printed by `cp`.
#[must_use]
pub fn copying_go(file: &str) -> String {
    go_script(&format!("    cp '{file}' \"$out\" || exit 1\n"))
}

fn go_script(build_action: &str) -> String {
    format!(
        concat!(
            "#!/bin/sh\n",
            "case \"$1\" in\n",
            "  get) exit 0 ;;\n",
            "  build)\n",
            "    shift\n",
            "    if [ \"$1\" = \"-v\" ]; then shift; fi\n",
            "    out=\"$2\"\n",
            "    mkdir -p \"$(dirname \"$out\")\"\n",
            "{action}",
            "    chmod 755 \"$out\"\n",
            "    ;;\n",
            "  *) echo \"unexpected go command: $*\" >&2; exit 2 ;;\n",
            "esac\n",
        ),
        action = build_action,
    )
}

/// A script that behaves like a dgtools command asked for help.
#[must_use]
pub fn help_tool_script(name: &str) -> String {
    format!(
        concat!(
            "#!/bin/sh\n",
            "echo 'NAME:'\n",
            "echo '    {name}'\n",
            "echo\n",
            "echo \"Use '{name} help <command>' for extra details\"\n",
        ),
        name = name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_script_contains_help_line() {
        assert!(help_tool_script("tz").contains("Use 'tz help <command>' for extra details"));
    }

    #[test]
    fn fake_go_embeds_tool_script() {
        let go = fake_go("#!/bin/sh\necho hi\n");
        assert!(go.contains("echo hi"));
        assert!(go.ends_with("esac\n"));
    }
}
