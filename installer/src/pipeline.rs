//! Packaging pipeline orchestration.
//!
//! A [`PackagingEngine`] drives one descriptor through fetch, build, install
//! and verify. Each stage runs only if the previous one succeeded and the
//! first failure ends the run; nothing is retried and nothing already written
//! is rolled back. The engine holds no per-tool state, so independent tools
//! can be run concurrently with [`PackagingEngine::run_all`].

use crate::builder::{Build, BuildConfig, Builder, Executable};
use crate::completion::{CompletionTemplate, templates_from_tree};
use crate::config::ResolvedConfig;
use crate::error::{PipelineError, Stage, StageError};
use crate::fetch::{Fetch, FetchConfig, Fetcher, SourceTree};
use crate::installer::{Install, InstallError, InstallationResult, Installer};
use crate::spec::{SpecError, ToolSpec, ensure_unique_names};
use crate::tool_name::ToolName;
use crate::verifier::{Verifier, Verify};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Progress of one tool through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum PipelineState {
    /// Not started.
    Pending,
    /// Source tree available.
    Fetched,
    /// Executable built.
    Built,
    /// Binary and completions installed.
    Installed,
    /// Smoke test passed.
    Verified,
    /// Run complete.
    Done,
    /// Run stopped at `stage`.
    Failed {
        /// The stage that failed.
        stage: Stage,
        /// Description of the failure.
        cause: String,
    },
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fetched => f.write_str("fetched"),
            Self::Built => f.write_str("built"),
            Self::Installed => f.write_str("installed"),
            Self::Verified => f.write_str("verified"),
            Self::Done => f.write_str("done"),
            Self::Failed { stage, .. } => write!(f, "failed at {stage}"),
        }
    }
}

/// Callback notified of every state transition.
pub type Observer<'a> = &'a (dyn Fn(&ToolName, &PipelineState) + Sync);

/// Outcome of one tool's pipeline run.
pub type RunOutcome = Result<InstallationResult, PipelineError>;

/// Runs descriptors through fetch, build, install and verify.
pub struct PackagingEngine {
    fetcher: Box<dyn Fetch + Send + Sync>,
    builder: Box<dyn Build + Send + Sync>,
    installer: Box<dyn Install + Send + Sync>,
    verifier: Box<dyn Verify + Send + Sync>,
}

impl PackagingEngine {
    /// Assemble the production stages from resolved configuration.
    #[must_use]
    pub fn from_config(config: &ResolvedConfig, verbose: bool) -> Self {
        Self::with_stages(
            Box::new(Fetcher::new(FetchConfig {
                cache_dir: config.cache_dir.clone(),
                timeout: config.fetch_timeout,
            })),
            Box::new(Builder::new(BuildConfig {
                toolchain: config.toolchain.clone(),
                timeout: config.build_timeout,
                verbose,
            })),
            Box::new(Installer::new(
                config.bin_dir.clone(),
                &config.completion_prefix,
            )),
            Box::new(Verifier::new(
                config.probe_args.clone(),
                config.probe_timeout,
            )),
        )
    }

    /// Assemble an engine from explicit stage implementations.
    #[must_use]
    pub fn with_stages(
        fetcher: Box<dyn Fetch + Send + Sync>,
        builder: Box<dyn Build + Send + Sync>,
        installer: Box<dyn Install + Send + Sync>,
        verifier: Box<dyn Verify + Send + Sync>,
    ) -> Self {
        Self {
            fetcher,
            builder,
            installer,
            verifier,
        }
    }

    /// Run `spec` through every stage.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] naming the first stage that failed.
    pub fn run(&self, spec: &ToolSpec, templates: &[CompletionTemplate]) -> RunOutcome {
        self.run_observed(spec, templates, &|_, _| {})
    }

    /// Run `spec` through every stage, reporting transitions to `observer`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] naming the first stage that failed.
    pub fn run_observed(
        &self,
        spec: &ToolSpec,
        templates: &[CompletionTemplate],
        observer: Observer<'_>,
    ) -> RunOutcome {
        transition(spec, observer, PipelineState::Pending);
        if let Err(e) = spec.validate() {
            return Err(fail(spec, observer, e));
        }

        let tree = advance(spec, observer, self.fetcher.fetch(spec), PipelineState::Fetched)?;
        let executable = advance(
            spec,
            observer,
            self.builder.build(&tree, spec),
            PipelineState::Built,
        )?;
        let installed = advance(
            spec,
            observer,
            self.install(&tree, &executable, spec, templates),
            PipelineState::Installed,
        )?;
        let verified = advance(
            spec,
            observer,
            self.verifier.verify(installed.binary_path(), spec),
            PipelineState::Verified,
        )?;

        let result = installed.with_verified(verified);
        transition(spec, observer, PipelineState::Done);
        Ok(result)
    }

    // Templates shipped in the tree take precedence over `templates`.
    fn install(
        &self,
        tree: &SourceTree,
        executable: &Executable,
        spec: &ToolSpec,
        templates: &[CompletionTemplate],
    ) -> Result<InstallationResult, InstallError> {
        match &spec.completions_dir {
            Some(dir) => {
                let shipped = templates_from_tree(&tree.root.join(dir), templates)?;
                self.installer.install(executable, spec, &shipped)
            }
            None => self.installer.install(executable, spec, templates),
        }
    }

    /// Run every descriptor, at most `jobs` at a time.
    ///
    /// Outcomes are returned in input order. One tool's failure does not
    /// affect the others. `None` runs all tools at once.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::DuplicateTool`] before anything runs if two
    /// descriptors share a name, since their installs would race.
    pub fn run_all(
        &self,
        specs: &[ToolSpec],
        templates: &[CompletionTemplate],
        jobs: Option<usize>,
        observer: Observer<'_>,
    ) -> Result<Vec<RunOutcome>, SpecError> {
        ensure_unique_names(specs)?;
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let workers = jobs.unwrap_or(specs.len()).clamp(1, specs.len());
        let counter = AtomicUsize::new(0);
        let next = &counter;
        let mut outcomes: Vec<(usize, RunOutcome)> = Vec::with_capacity(specs.len());

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(spec) = specs.get(index) else {
                                break;
                            };
                            done.push((index, self.run_observed(spec, templates, observer)));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(done) => outcomes.extend(done),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });

        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

fn transition(spec: &ToolSpec, observer: Observer<'_>, state: PipelineState) {
    log::debug!("{}: {state}", spec.name);
    observer(&spec.name, &state);
}

fn fail(spec: &ToolSpec, observer: Observer<'_>, cause: impl Into<StageError>) -> PipelineError {
    let err = PipelineError::new(spec.name.clone(), cause);
    transition(
        spec,
        observer,
        PipelineState::Failed {
            stage: err.stage,
            cause: err.cause.to_string(),
        },
    );
    err
}

fn advance<T, E>(
    spec: &ToolSpec,
    observer: Observer<'_>,
    result: Result<T, E>,
    next: PipelineState,
) -> Result<T, PipelineError>
where
    E: Into<StageError>,
{
    match result {
        Ok(value) => {
            transition(spec, observer, next);
            Ok(value)
        }
        Err(e) => Err(fail(spec, observer, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildError, Executable, MockBuild};
    use crate::completion::bundled_templates;
    use crate::fetch::{FetchError, MockFetch, Trust};
    use crate::installer::MockInstall;
    use crate::sha256_digest::Sha256Digest;
    use crate::verifier::{MockVerify, VerificationError};
    use camino::{Utf8Path, Utf8PathBuf};
    use std::sync::Mutex;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::archive(name, "https://example.test/src.tar.gz", None)
    }

    fn templates() -> Vec<CompletionTemplate> {
        bundled_templates(Utf8Path::new("/c/bash"), Utf8Path::new("/c/zsh"))
    }

    fn fetch_ok() -> MockFetch {
        let mut fetcher = MockFetch::new();
        fetcher.expect_fetch().returning(|_| {
            Ok(SourceTree {
                root: Utf8PathBuf::from("/cache/src"),
                trust: Trust::Verified,
                cache_hit: false,
            })
        });
        fetcher
    }

    fn build_ok() -> MockBuild {
        let mut builder = MockBuild::new();
        builder.expect_build().returning(|_, spec| {
            Ok(Executable {
                name: spec.name.clone(),
                path: Utf8PathBuf::from(format!("/build/{}", spec.name)),
            })
        });
        builder
    }

    fn install_ok() -> MockInstall {
        let mut installer = MockInstall::new();
        installer.expect_install().returning(|_, spec, _| {
            Ok(InstallationResult::new(
                spec.name.clone(),
                Utf8PathBuf::from(format!("/bin/{}", spec.name)),
                vec![Utf8PathBuf::from(format!("/c/bash/dgtools.{}.bash", spec.name))],
            ))
        });
        installer
    }

    fn verify_ok() -> MockVerify {
        let mut verifier = MockVerify::new();
        verifier.expect_verify().returning(|_, _| Ok(true));
        verifier
    }

    fn engine(
        fetcher: MockFetch,
        builder: MockBuild,
        installer: MockInstall,
        verifier: MockVerify,
    ) -> PackagingEngine {
        PackagingEngine::with_stages(
            Box::new(fetcher),
            Box::new(builder),
            Box::new(installer),
            Box::new(verifier),
        )
    }

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<(String, PipelineState)>>,
    }

    impl Recorder {
        fn record(&self, tool: &ToolName, state: &PipelineState) {
            if let Ok(mut states) = self.states.lock() {
                states.push((tool.to_string(), state.clone()));
            }
        }

        fn states_for(&self, tool: &str) -> Vec<PipelineState> {
            self.states
                .lock()
                .expect("recorder lock")
                .iter()
                .filter(|(t, _)| t == tool)
                .map(|(_, s)| s.clone())
                .collect()
        }
    }

    #[test]
    fn successful_run_walks_every_state() {
        let recorder = Recorder::default();
        let engine = engine(fetch_ok(), build_ok(), install_ok(), verify_ok());

        let result = engine
            .run_observed(&spec("tz"), &templates(), &|t, s| recorder.record(t, s))
            .expect("run");

        assert!(result.verified());
        assert_eq!(result.binary_path(), Utf8Path::new("/bin/tz"));
        assert_eq!(
            recorder.states_for("tz"),
            vec![
                PipelineState::Pending,
                PipelineState::Fetched,
                PipelineState::Built,
                PipelineState::Installed,
                PipelineState::Verified,
                PipelineState::Done,
            ]
        );
    }

    #[test]
    fn checksum_mismatch_stops_before_build() {
        let mut fetcher = MockFetch::new();
        fetcher.expect_fetch().returning(|_| {
            Err(FetchError::ChecksumMismatch {
                url: "https://example.test/src.tar.gz".to_owned(),
                expected: Sha256Digest::try_from("a".repeat(64)).expect("digest"),
                actual: Sha256Digest::try_from("b".repeat(64)).expect("digest"),
            })
        });
        let mut builder = MockBuild::new();
        builder.expect_build().never();
        let mut installer = MockInstall::new();
        installer.expect_install().never();
        let mut verifier = MockVerify::new();
        verifier.expect_verify().never();
        let recorder = Recorder::default();

        let err = engine(fetcher, builder, installer, verifier)
            .run_observed(&spec("bake"), &templates(), &|t, s| recorder.record(t, s))
            .expect_err("mismatch");

        assert_eq!(err.stage, Stage::Fetch);
        assert!(matches!(
            err.cause,
            StageError::Fetch(FetchError::ChecksumMismatch { .. })
        ));
        assert!(matches!(
            recorder.states_for("bake").last(),
            Some(PipelineState::Failed {
                stage: Stage::Fetch,
                ..
            })
        ));
    }

    #[test]
    fn invalid_spec_is_rejected_before_fetch() {
        let mut fetcher = MockFetch::new();
        fetcher.expect_fetch().never();
        let mut bad = spec("tz");
        bad.source_ref = None;

        let err = engine(fetcher, MockBuild::new(), MockInstall::new(), MockVerify::new())
            .run(&bad, &templates())
            .expect_err("invalid");

        assert_eq!(err.stage, Stage::Validate);
    }

    #[test]
    fn build_failure_stops_before_install() {
        let mut builder = MockBuild::new();
        builder.expect_build().returning(|_, spec| {
            Err(BuildError::ToolchainFailed {
                tool: spec.name.clone(),
                step: "go build -o tz".to_owned(),
                status: "exit code 1".to_owned(),
                output: "undefined: x\n".to_owned(),
            })
        });
        let mut installer = MockInstall::new();
        installer.expect_install().never();

        let err = engine(fetch_ok(), builder, installer, MockVerify::new())
            .run(&spec("tz"), &templates())
            .expect_err("build failure");

        assert_eq!(err.stage, Stage::Build);
        assert!(err.to_string().contains("undefined: x"));
    }

    #[test]
    fn shipped_template_without_placeholder_fails_after_build() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        std::fs::create_dir_all(root.join("HomebrewFormula")).expect("mkdir");
        std::fs::write(
            root.join("HomebrewFormula/completions.bash"),
            "complete -C bake bake\n",
        )
        .expect("write template");
        let mut fetcher = MockFetch::new();
        fetcher.expect_fetch().returning(move |_| {
            Ok(SourceTree {
                root: root.clone(),
                trust: Trust::Verified,
                cache_hit: false,
            })
        });
        let mut builder = MockBuild::new();
        builder.expect_build().times(1).returning(|_, spec| {
            Ok(Executable {
                name: spec.name.clone(),
                path: Utf8PathBuf::from(format!("/build/{}", spec.name)),
            })
        });
        let mut installer = MockInstall::new();
        installer.expect_install().never();
        let mut bake = spec("bake");
        bake.completions_dir = Some(Utf8PathBuf::from("HomebrewFormula"));
        let recorder = Recorder::default();

        let err = engine(fetcher, builder, installer, MockVerify::new())
            .run_observed(&bake, &templates(), &|t, s| recorder.record(t, s))
            .expect_err("missing placeholder");

        assert_eq!(err.stage, Stage::Install);
        assert!(matches!(
            err.cause,
            StageError::Install(InstallError::PlaceholderMissing { .. })
        ));
        let states = recorder.states_for("bake");
        assert_eq!(
            states.get(..3),
            Some(
                &[
                    PipelineState::Pending,
                    PipelineState::Fetched,
                    PipelineState::Built,
                ][..]
            )
        );
        assert!(matches!(
            states.last(),
            Some(PipelineState::Failed {
                stage: Stage::Install,
                ..
            })
        ));
    }

    #[test]
    fn verification_failure_is_reported_at_verify_stage() {
        let mut verifier = MockVerify::new();
        verifier.expect_verify().returning(|_, spec| {
            Err(VerificationError::PatternMissing {
                tool: spec.name.clone(),
                pattern: "Use 'tz help[^']*' for extra details".to_owned(),
                output: "usage: tz\n".to_owned(),
            })
        });

        let err = engine(fetch_ok(), build_ok(), install_ok(), verifier)
            .run(&spec("tz"), &templates())
            .expect_err("verification failure");

        assert_eq!(err.stage, Stage::Verify);
    }

    #[test]
    fn run_all_rejects_duplicate_names() {
        let mut fetcher = MockFetch::new();
        fetcher.expect_fetch().never();

        let result = engine(fetcher, MockBuild::new(), MockInstall::new(), MockVerify::new())
            .run_all(&[spec("tz"), spec("tz")], &templates(), None, &|_, _| {});

        assert!(matches!(result, Err(SpecError::DuplicateTool { .. })));
    }

    #[rstest::rstest]
    #[case::serial(Some(1))]
    #[case::bounded(Some(2))]
    #[case::unbounded(None)]
    fn run_all_isolates_failures_and_keeps_order(#[case] jobs: Option<usize>) {
        let mut builder = MockBuild::new();
        builder.expect_build().returning(|_, spec| {
            if spec.name.as_str() == "bt" {
                return Err(BuildError::MissingArtifact {
                    tool: spec.name.clone(),
                    path: Utf8PathBuf::from("/build/bt"),
                });
            }
            Ok(Executable {
                name: spec.name.clone(),
                path: Utf8PathBuf::from(format!("/build/{}", spec.name)),
            })
        });
        let specs = [spec("tz"), spec("bt"), spec("bake")];

        let outcomes = engine(fetch_ok(), builder, install_ok(), verify_ok())
            .run_all(&specs, &templates(), jobs, &|_, _| {})
            .expect("unique names");

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes.first(), Some(Ok(r)) if r.tool().as_str() == "tz"));
        assert!(matches!(outcomes.get(1), Some(Err(e)) if e.stage == Stage::Build));
        assert!(matches!(outcomes.get(2), Some(Ok(r)) if r.tool().as_str() == "bake"));
    }

    #[test]
    fn run_all_with_no_specs_is_empty() {
        let outcomes = engine(
            MockFetch::new(),
            MockBuild::new(),
            MockInstall::new(),
            MockVerify::new(),
        )
        .run_all(&[], &templates(), Some(4), &|_, _| {})
        .expect("empty");
        assert!(outcomes.is_empty());
    }
}
