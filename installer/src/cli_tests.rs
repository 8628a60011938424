//! Tests for installer CLI parsing and configuration overrides.

use super::*;
use clap::CommandFactory;
use rstest::rstest;

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_install_with_names() {
    let cli = Cli::parse_from(["dgtools-installer", "install", "bake", "tz"]);
    match cli.command {
        Command::Install(args) => {
            assert_eq!(args.select.formulae, vec!["bake", "tz"]);
            assert!(!args.select.all);
            assert!(args.jobs.is_none());
            assert!(!args.json);
        }
        other => panic!("expected install, got {other:?}"),
    }
}

#[test]
fn cli_parses_install_locations() {
    let cli = Cli::parse_from([
        "dgtools-installer",
        "install",
        "--all",
        "--formula-dir",
        "formulae",
        "--bin-dir",
        "/opt/bin",
        "--bash-completion-dir",
        "/opt/bash",
        "--zsh-completion-dir",
        "/opt/zsh",
        "--cache-dir",
        "/var/cache/dgtools",
        "--jobs",
        "2",
        "--json",
    ]);
    let Command::Install(args) = cli.command else {
        panic!("expected install");
    };

    let mut config = EngineConfig::default();
    args.apply(&mut config);

    assert_eq!(config.formula_dir, Some(Utf8PathBuf::from("formulae")));
    assert_eq!(config.bin_dir, Some(Utf8PathBuf::from("/opt/bin")));
    assert_eq!(config.bash_completion_dir, Some(Utf8PathBuf::from("/opt/bash")));
    assert_eq!(config.zsh_completion_dir, Some(Utf8PathBuf::from("/opt/zsh")));
    assert_eq!(config.cache_dir, Some(Utf8PathBuf::from("/var/cache/dgtools")));
    assert_eq!(config.jobs, Some(2));
    assert!(args.json);
}

#[test]
fn install_requires_a_selection() {
    let result = Cli::try_parse_from(["dgtools-installer", "install"]);
    assert!(result.is_err());
}

#[test]
fn absent_overrides_keep_file_values() {
    let mut config = EngineConfig {
        bin_dir: Some(Utf8PathBuf::from("/from/file")),
        jobs: Some(8),
        ..EngineConfig::default()
    };
    InstallArgs::default().apply(&mut config);

    assert_eq!(config.bin_dir, Some(Utf8PathBuf::from("/from/file")));
    assert_eq!(config.jobs, Some(8));
}

#[test]
fn cli_parses_completion() {
    let cli = Cli::parse_from(["dgtools-installer", "completion", "bake", "--shell", "zsh"]);
    match cli.command {
        Command::Completion(args) => {
            assert_eq!(args.name, "bake");
            assert_eq!(args.shell, ShellFamily::Zsh);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn completion_rejects_unknown_shell() {
    let result = Cli::try_parse_from([
        "dgtools-installer",
        "completion",
        "bake",
        "--shell",
        "fish",
    ]);
    assert!(result.is_err());
}

#[test]
fn cli_parses_verify_with_bin_dir() {
    let cli = Cli::parse_from(["dgtools-installer", "verify", "tz", "--bin-dir", "/opt/bin"]);
    let Command::Verify(args) = cli.command else {
        panic!("expected verify");
    };
    assert_eq!(args.bin_dir, Some(Utf8PathBuf::from("/opt/bin")));
    assert_eq!(args.select.formulae, vec!["tz"]);
}

#[test]
fn global_flags_follow_subcommand() {
    let cli = Cli::parse_from(["dgtools-installer", "check", "--all", "-vv", "--config", "x.toml"]);
    assert_eq!(cli.global.verbosity, 2);
    assert_eq!(cli.global.config, Some(Utf8PathBuf::from("x.toml")));
    assert!(matches!(cli.command, Command::Check(_)));
}

#[test]
fn quiet_conflicts_with_verbose() {
    let result = Cli::try_parse_from(["dgtools-installer", "check", "--all", "-q", "-v"]);
    assert!(result.is_err());
}

#[rstest]
#[case::default(0, false, "warn")]
#[case::info(1, false, "info")]
#[case::debug(2, false, "debug")]
#[case::trace(5, false, "trace")]
#[case::quiet(0, true, "error")]
fn log_filter_tracks_verbosity(#[case] verbosity: u8, #[case] quiet: bool, #[case] expected: &str) {
    let args = GlobalArgs {
        config: None,
        verbosity,
        quiet,
    };
    assert_eq!(args.log_filter(), expected);
}
