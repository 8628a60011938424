//! Command implementations behind the installer binary.
//!
//! Each subcommand loads configuration, applies CLI overrides, resolves the
//! selected formulae and then drives the library. Output goes to the writers
//! passed in so the flows can be exercised without a terminal.

use crate::cli::{Cli, Command, CompletionArgs, GlobalArgs, InstallArgs, SelectArgs, VerifyArgs};
use crate::completion::{CompletionTemplate, ShellFamily};
use crate::config::{EngineConfig, ResolvedConfig};
use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::formula::resolve_formulae;
use crate::output::{
    RunReport, outcome_line, progress_line, summary_line, write_json_report, write_stderr_line,
};
use crate::pipeline::{PackagingEngine, PipelineState, RunOutcome};
use crate::spec::{SourceRef, ToolSpec, ensure_unique_names};
use crate::tool_name::{ToolName, validate_tool_name};
use crate::verifier::{Verifier, Verify};
use std::io::Write;
use std::sync::Mutex;

/// Writers a command reports to.
pub struct Streams<'a> {
    /// Machine-readable output and rendered scripts.
    pub stdout: &'a mut (dyn Write + Send),
    /// Progress, summaries and errors.
    pub stderr: &'a mut (dyn Write + Send),
}

/// Run the subcommand selected on the command line.
///
/// # Errors
///
/// Returns an [`InstallerError`] if configuration or formulae cannot be
/// loaded, or if any selected tool fails.
pub fn run(cli: &Cli, dirs: &dyn BaseDirs, streams: &mut Streams<'_>) -> Result<()> {
    let config = EngineConfig::load(cli.global.config.as_deref(), dirs)?;
    match &cli.command {
        Command::Install(args) => run_install(args, config, &cli.global, dirs, streams),
        Command::Check(args) => run_check(args, config, &cli.global, streams),
        Command::Verify(args) => run_verify(args, config, &cli.global, dirs, streams),
        Command::Completion(args) => run_completion(args, &config, dirs, streams),
    }
}

/// Install every selected tool.
///
/// # Errors
///
/// Returns [`InstallerError::ToolsFailed`] when at least one tool failed,
/// after every tool has been attempted and reported.
pub fn run_install(
    args: &InstallArgs,
    mut config: EngineConfig,
    global: &GlobalArgs,
    dirs: &dyn BaseDirs,
    streams: &mut Streams<'_>,
) -> Result<()> {
    args.apply(&mut config);
    let resolved = config.resolve(dirs)?;
    let specs = select(&args.select, &resolved)?;
    let templates = resolved.completion_templates()?;
    let engine = PackagingEngine::from_config(&resolved, global.verbosity > 0);

    let options = ReportOptions {
        quiet: global.quiet,
        json: args.json,
    };
    install_specs(&engine, &specs, &templates, resolved.jobs, options, streams)
}

/// How [`install_specs`] reports progress and results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Suppress progress and per-tool success lines.
    pub quiet: bool,
    /// Write a JSON report to stdout.
    pub json: bool,
}

/// Run `specs` through `engine` and report the outcomes.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidSpec`] for duplicate names and
/// [`InstallerError::ToolsFailed`] when any tool failed.
pub fn install_specs(
    engine: &PackagingEngine,
    specs: &[ToolSpec],
    templates: &[CompletionTemplate],
    jobs: Option<usize>,
    options: ReportOptions,
    streams: &mut Streams<'_>,
) -> Result<()> {
    let outcomes = {
        let progress = Mutex::new(&mut *streams.stderr);
        let observer = |tool: &ToolName, state: &PipelineState| {
            if options.quiet || matches!(state, PipelineState::Pending | PipelineState::Done) {
                return;
            }
            if let Ok(mut stderr) = progress.lock() {
                write_stderr_line(&mut **stderr, progress_line(tool, state));
            }
        };
        engine.run_all(specs, templates, jobs, &observer)?
    };

    report_outcomes(&outcomes, options, streams)
}

fn report_outcomes(
    outcomes: &[RunOutcome],
    options: ReportOptions,
    streams: &mut Streams<'_>,
) -> Result<()> {
    let failed = outcomes.iter().filter(|o| o.is_err()).count();

    for outcome in outcomes {
        if outcome.is_err() || !options.quiet {
            write_stderr_line(&mut *streams.stderr, outcome_line(outcome));
        }
    }
    if options.json {
        write_json_report(&mut *streams.stdout, &RunReport::new(outcomes))
            .map_err(|source| InstallerError::WriteFailed { source })?;
    }
    if !options.quiet {
        write_stderr_line(&mut *streams.stderr, summary_line(outcomes.len(), failed));
    }

    if failed > 0 {
        return Err(InstallerError::ToolsFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

/// Validate the selected formulae without fetching anything.
///
/// # Errors
///
/// Returns an [`InstallerError`] for the first formula that fails to load,
/// or if two formulae share a name.
pub fn run_check(
    args: &SelectArgs,
    mut config: EngineConfig,
    global: &GlobalArgs,
    streams: &mut Streams<'_>,
) -> Result<()> {
    args.apply(&mut config);
    let specs = resolve_formulae(&args.formulae, config.formula_dir.as_deref(), args.all)?;
    if specs.is_empty() {
        return Err(InstallerError::NothingSelected);
    }
    ensure_unique_names(&specs)?;

    if !global.quiet {
        for spec in &specs {
            write_stderr_line(
                &mut *streams.stderr,
                format!("{}: ok ({})", spec.name, describe_source(spec)),
            );
        }
        write_stderr_line(&mut *streams.stderr, format!("{} formula(e) valid", specs.len()));
    }
    Ok(())
}

fn describe_source(spec: &ToolSpec) -> String {
    match &spec.source_ref {
        Some(SourceRef::VersionedArchive(archive)) if archive.sha256.is_some() => {
            "pinned archive".to_owned()
        }
        Some(SourceRef::VersionedArchive(_)) => "unpinned archive".to_owned(),
        Some(SourceRef::LiveRef(live)) => format!("live branch {}", live.branch),
        None => "no source".to_owned(),
    }
}

/// Probe already-installed binaries of the selected tools.
///
/// # Errors
///
/// Returns [`InstallerError::ToolsFailed`] when any probe fails.
pub fn run_verify(
    args: &VerifyArgs,
    mut config: EngineConfig,
    global: &GlobalArgs,
    dirs: &dyn BaseDirs,
    streams: &mut Streams<'_>,
) -> Result<()> {
    args.select.apply(&mut config);
    if let Some(dir) = &args.bin_dir {
        config.bin_dir = Some(dir.clone());
    }
    let resolved = config.resolve(dirs)?;
    let specs = select(&args.select, &resolved)?;
    let verifier = Verifier::new(resolved.probe_args.clone(), resolved.probe_timeout);

    verify_installed(&verifier, &specs, &resolved, global.quiet, streams)
}

/// Probe `{bin_dir}/{name}` for each of `specs` with `verifier`.
///
/// # Errors
///
/// Returns [`InstallerError::ToolsFailed`] when any probe fails.
pub fn verify_installed(
    verifier: &dyn Verify,
    specs: &[ToolSpec],
    config: &ResolvedConfig,
    quiet: bool,
    streams: &mut Streams<'_>,
) -> Result<()> {
    let mut failed = 0;
    for spec in specs {
        let binary = config.bin_dir.join(spec.name.as_str());
        match verifier.verify(&binary, spec) {
            Ok(_) => {
                if !quiet {
                    write_stderr_line(&mut *streams.stderr, format!("{}: ok", spec.name));
                }
            }
            Err(e) => {
                failed += 1;
                write_stderr_line(
                    &mut *streams.stderr,
                    format!("{}: verify failed: {e}", spec.name),
                );
            }
        }
    }

    if failed > 0 {
        return Err(InstallerError::ToolsFailed {
            failed,
            total: specs.len(),
        });
    }
    Ok(())
}

/// Print the completion script `args.shell` would install for `args.name`.
///
/// # Errors
///
/// Returns an [`InstallerError`] if the name is invalid or a configured
/// template cannot be loaded.
pub fn run_completion(
    args: &CompletionArgs,
    config: &EngineConfig,
    dirs: &dyn BaseDirs,
    streams: &mut Streams<'_>,
) -> Result<()> {
    let name = ToolName::from(args.name.as_str());
    validate_tool_name(&name)?;

    let resolved = config.resolve(dirs)?;
    let template = resolved
        .completion_templates()?
        .into_iter()
        .find(|t| t.shell() == args.shell)
        .unwrap_or_else(|| {
            CompletionTemplate::bundled(args.shell, shell_dir(&resolved, args.shell))
        });

    write!(streams.stdout, "{}", template.render(&name))
        .map_err(|source| InstallerError::WriteFailed { source })
}

fn shell_dir(config: &ResolvedConfig, shell: ShellFamily) -> camino::Utf8PathBuf {
    match shell {
        ShellFamily::Bash => config.bash_completion_dir.clone(),
        ShellFamily::Zsh => config.zsh_completion_dir.clone(),
    }
}

fn select(args: &SelectArgs, config: &ResolvedConfig) -> Result<Vec<ToolSpec>> {
    let specs = resolve_formulae(&args.formulae, config.formula_dir.as_deref(), args.all)?;
    if specs.is_empty() {
        return Err(InstallerError::NothingSelected);
    }
    Ok(specs)
}
