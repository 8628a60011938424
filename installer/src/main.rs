//! dgtools installer CLI entrypoint.
//!
//! This binary fetches, builds and installs dgtools command-line tools from
//! formula files, then smoke-tests each installed tool.

use clap::Parser;
use dgtools_installer::cli::Cli;
use dgtools_installer::dirs::SystemBaseDirs;
use dgtools_installer::error::{InstallerError, Result};
use dgtools_installer::install_flow::{Streams, run};
use dgtools_installer::output::write_stderr_line;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let env = env_logger::Env::default().default_filter_or(cli.global.log_filter());
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .init();

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run_cli(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run_cli(
    cli: &Cli,
    stdout: &mut (dyn Write + Send),
    stderr: &mut (dyn Write + Send),
) -> Result<()> {
    let dirs = SystemBaseDirs::new().ok_or_else(|| InstallerError::Config {
        path: dgtools_installer::config::CONFIG_FILE.into(),
        reason: "could not determine the home directory".to_owned(),
    })?;
    let mut streams = Streams { stdout, stderr };
    run(cli, &dirs, &mut streams)
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}
