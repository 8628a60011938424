//! Child-process execution with a caller-supplied timeout.
//!
//! Fetch, build and probe invocations all need the same thing: run a command,
//! capture both output streams in full and give up after a deadline instead of
//! hanging. Output pipes are drained on helper threads so a chatty child
//! cannot block on a full pipe while the parent waits for it.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Attempts made when the kernel reports the executable as busy.
const SPAWN_ATTEMPTS: u32 = 5;

/// Delay between spawn attempts.
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

type PipeReader = JoinHandle<io::Result<Vec<u8>>>;

/// Run `command` to completion, or until `timeout` elapses.
///
/// Returns `Ok(None)` when the timeout was reached; the child is killed in
/// that case. Standard input is closed.
///
/// # Errors
///
/// Returns an I/O error if the command cannot be spawned or waited on.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
) -> io::Result<Option<Output>> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn_with_retry(command)?;
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match timeout {
        Some(limit) => child.wait_timeout(limit)?,
        None => Some(child.wait()?),
    };

    let Some(status) = status else {
        if let Err(e) = child.kill() {
            log::debug!("failed to kill timed-out child: {e}");
        }
        if let Err(e) = child.wait() {
            log::debug!("failed to reap timed-out child: {e}");
        }
        return Ok(None);
    };

    Ok(Some(Output {
        status,
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
    }))
}

/// Render captured stdout and stderr as one diagnostic string.
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.into_owned(),
        (true, false) => stderr.into_owned(),
        (false, false) => format!("{stdout}{stderr}"),
    }
}

/// Describe an exit status for error messages.
#[must_use]
pub fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

/// Render a program and its arguments for diagnostics.
#[must_use]
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

// A freshly written executable can still be open for writing in a child forked
// concurrently by another thread; spawning then fails with ETXTBSY until that
// child execs.
fn spawn_with_retry(command: &mut Command) -> io::Result<std::process::Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if e.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                thread::sleep(SPAWN_RETRY_DELAY);
            }
            result => return result,
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> PipeReader {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn collect(reader: Option<PipeReader>) -> io::Result<Vec<u8>> {
    match reader {
        None => Ok(Vec::new()),
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("output reader thread panicked"))?,
    }
}
