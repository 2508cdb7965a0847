//! Scan orchestration: locate → install packs → create database → analyze
//!
//! Each step blocks until the tool exits. A failing step stops the run; only pack
//! installation is allowed to fail without aborting.

use crate::codeql;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::locator::{BundleFetcher, HttpBundleFetcher, ToolLocator};
use crate::progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
use crate::runner::{CommandSpec, Interrupt, ProcessRunner, TokioProcessRunner, ToolOutput};
use crate::types::{AnalysisSpec, BuildSpec, ToolLocation, ToolPhase};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Inputs of one build-then-analyze run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub build: BuildSpec,
    pub analysis: AnalysisSpec,
}

impl ScanRequest {
    /// Builds both phase specs; `db_name` and `threads` are shared between them
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_command: impl Into<String>,
        db_name: impl Into<String>,
        language: impl Into<String>,
        queries: impl Into<String>,
        output: impl Into<PathBuf>,
        threads: u32,
    ) -> Self {
        let db_name = db_name.into();
        Self {
            build: BuildSpec {
                source_root: source_root.into(),
                build_command: build_command.into(),
                db_name: db_name.clone(),
                language: language.into(),
                threads,
            },
            analysis: AnalysisSpec {
                db_name,
                queries: queries.into(),
                threads,
                output: output.into(),
            },
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub tool: ToolLocation,
    /// SARIF file as given by the caller
    pub sarif_path: PathBuf,
    pub packs_installed: usize,
    pub create: ToolOutput,
    pub analyze: ToolOutput,
}

pub struct Scanner {
    config: ScanConfig,
    runner: Arc<dyn ProcessRunner>,
    fetcher: Arc<dyn BundleFetcher>,
    progress: Box<dyn ProgressHandler>,
    interrupt: Interrupt,
}

impl Scanner {
    /// Scanner with the real process runner, HTTP fetcher and log-based progress
    ///
    /// Ctrl-C is observed for the lifetime of the scanner and aborts whichever step
    /// is running. Must be called from within a Tokio runtime.
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        let interrupt = Interrupt::on_ctrl_c();
        let runner = Arc::new(
            TokioProcessRunner::new(config.invocation_timeout).with_interrupt(interrupt.clone()),
        );
        let fetcher = Arc::new(HttpBundleFetcher::new()?);
        Ok(Self::with_components(config, runner, fetcher)
            .with_progress(LoggingHandler)
            .with_interrupt(interrupt))
    }

    pub fn with_components(
        config: ScanConfig,
        runner: Arc<dyn ProcessRunner>,
        fetcher: Arc<dyn BundleFetcher>,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
            progress: Box::new(NoOpHandler),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_progress(mut self, handler: impl ProgressHandler + 'static) -> Self {
        self.progress = Box::new(handler);
        self
    }

    /// Interrupt checked while locating the tool; pass the runner's own
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(&event);
    }

    /// Runs the whole sequence and returns the results location
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();
        self.emit(ProgressEvent::Started {
            source_root: request.build.source_root.clone(),
        });

        let result = self.run_steps(request).await;

        match &result {
            Ok(outcome) => self.emit(ProgressEvent::Completed {
                sarif_path: outcome.sarif_path.clone(),
                total_time: start.elapsed(),
            }),
            Err(e) => self.emit(ProgressEvent::Failed {
                error: e.to_string(),
            }),
        }

        result
    }

    async fn run_steps(&self, request: &ScanRequest) -> Result<ScanOutcome, ScanError> {
        let tool = self.locate().await?;
        let packs_installed = self.install_packs(&tool).await?;
        let create = self.create_database(&tool, &request.build).await?;
        let analyze = self.analyze_database(&tool, &request.analysis).await?;

        Ok(ScanOutcome {
            tool,
            sarif_path: request.analysis.output.clone(),
            packs_installed,
            create,
            analyze,
        })
    }

    pub async fn locate(&self) -> Result<ToolLocation, ScanError> {
        let locator = ToolLocator::new(&self.config, self.fetcher.as_ref());
        let tool = tokio::select! {
            biased;
            _ = self.interrupt.triggered() => return Err(ScanError::Interrupted),
            tool = locator.locate() => tool?,
        };
        self.emit(ProgressEvent::ToolLocated {
            executable: tool.executable().to_path_buf(),
            source: tool.source(),
        });
        Ok(tool)
    }

    /// Installs the configured extra packs and returns how many succeeded
    ///
    /// Failures are logged and skipped. Cancellation still aborts the run.
    pub async fn install_packs(&self, tool: &ToolLocation) -> Result<usize, ScanError> {
        let mut installed = 0;

        for pack in &self.config.extra_packs {
            let path = pack.resolve(&self.config.work_dir);
            info!(pack = %path.display(), "Installing query pack");

            let command = codeql::pack_install(tool, &path).in_dir(&self.config.work_dir);
            let success = match self.runner.run(ToolPhase::PackInstall, &command).await {
                Ok(output) if output.success() => true,
                Ok(output) => {
                    warn!(pack = %path.display(), code = ?output.exit_code(), "codeql pack install failed");
                    false
                }
                Err(e @ (ScanError::Cancelled { .. } | ScanError::Interrupted)) => return Err(e),
                Err(e) => {
                    warn!(pack = %path.display(), error = %e, "codeql pack install failed");
                    false
                }
            };

            if success {
                installed += 1;
            }
            self.emit(ProgressEvent::PackInstallComplete {
                pack: path,
                success,
            });
        }

        Ok(installed)
    }

    pub async fn create_database(
        &self,
        tool: &ToolLocation,
        spec: &BuildSpec,
    ) -> Result<ToolOutput, ScanError> {
        info!(database = %spec.db_name, language = %spec.language, "Creating database");
        let command =
            codeql::database_create(tool, spec, self.config.overwrite).in_dir(&self.config.work_dir);
        self.run_phase(ToolPhase::DatabaseCreate, command).await
    }

    pub async fn analyze_database(
        &self,
        tool: &ToolLocation,
        spec: &AnalysisSpec,
    ) -> Result<ToolOutput, ScanError> {
        if self.config.verify_database {
            let database = self.config.resolve(Path::new(&spec.db_name));
            if !codeql::is_database(&database) {
                return Err(ScanError::Precondition { database });
            }
        }

        let results = self.config.resolve(&spec.output);
        if results.is_file() {
            debug!(path = %results.display(), "Removing stale results");
            fs::remove_file(&results).map_err(|e| {
                ScanError::io(format!("Failed to remove stale {}", results.display()), e)
            })?;
        }

        info!(database = %spec.db_name, queries = %spec.queries, "Analyzing database");
        let command = codeql::database_analyze(tool, spec).in_dir(&self.config.work_dir);
        let output = self.run_phase(ToolPhase::DatabaseAnalyze, command).await?;

        if !results.is_file() {
            return Err(ScanError::MissingResults { path: results });
        }

        Ok(output)
    }

    async fn run_phase(
        &self,
        phase: ToolPhase,
        command: CommandSpec,
    ) -> Result<ToolOutput, ScanError> {
        self.emit(ProgressEvent::PhaseStarted { phase });
        let output = self.runner.run(phase, &command).await?.into_result()?;
        self.emit(ProgressEvent::PhaseComplete {
            phase,
            duration: output.duration,
        });
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        bundle_tar_gz, install_fake_tool, scan_config, CountingFetcher, RecordingRunner,
    };
    use crate::types::{ExtraPack, LocationSource};
    use std::ffi::OsString;
    use std::sync::Mutex;

    fn request() -> ScanRequest {
        ScanRequest::new(
            "./app",
            "dotnet build",
            "codeql-db-app",
            "csharp",
            "codeql/csharp-all",
            "codeql-results.sarif",
            8,
        )
    }

    fn scanner(
        config: ScanConfig,
        runner: &Arc<RecordingRunner>,
        fetcher: &Arc<CountingFetcher>,
    ) -> Scanner {
        Scanner::with_components(config, runner.clone(), fetcher.clone())
    }

    #[derive(Default)]
    struct EventLog(Arc<Mutex<Vec<String>>>);

    impl ProgressHandler for EventLog {
        fn on_progress(&self, event: &ProgressEvent) {
            let name = format!("{:?}", event);
            let name = name.split([' ', '{']).next().unwrap_or_default().to_string();
            self.0.lock().unwrap().push(name);
        }
    }

    #[tokio::test]
    async fn test_full_scan_with_local_tool() {
        let work = tempfile::tempdir().unwrap();
        let exe = install_fake_tool(&work.path().join("codeql"));
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::failing());

        let outcome = scanner(scan_config(work.path()), &runner, &fetcher)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(outcome.tool.executable(), exe.as_path());
        assert_eq!(outcome.sarif_path, PathBuf::from("codeql-results.sarif"));
        assert!(work.path().join("codeql-results.sarif").is_file());
        assert_eq!(
            runner.phases(),
            vec![ToolPhase::DatabaseCreate, ToolPhase::DatabaseAnalyze]
        );

        let calls = runner.calls();
        let create = &calls[0].1;
        assert_eq!(create.program, exe);
        assert_eq!(create.flag_value("--language"), Some(&OsString::from("csharp")));
        assert_eq!(create.flag_value("--command"), Some(&OsString::from("dotnet build")));
        assert_eq!(create.flag_value("--source-root"), Some(&OsString::from("./app")));
        assert!(create.has_arg("--overwrite"));
        assert_eq!(create.current_dir.as_deref(), Some(work.path()));

        let analyze = &calls[1].1;
        assert_eq!(analyze.args[3], OsString::from("codeql-db-app"));
        assert_eq!(analyze.args[4], OsString::from("codeql/csharp-all"));
        assert!(analyze.has_arg("--format=sarif-latest"));
        assert_eq!(
            analyze.flag_value("--output"),
            Some(&OsString::from("codeql-results.sarif"))
        );
    }

    #[tokio::test]
    async fn test_full_scan_fetches_missing_tool() {
        let work = tempfile::tempdir().unwrap();
        let config = scan_config(work.path());
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::serving(bundle_tar_gz(
            "codeql",
            config.platform.executable_name(),
        )));

        let outcome = scanner(config, &runner, &fetcher)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(outcome.tool.source(), LocationSource::Fetched);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_create_failure_stops_before_analyze() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let runner = Arc::new(RecordingRunner::new().failing(ToolPhase::DatabaseCreate, 2));
        let fetcher = Arc::new(CountingFetcher::failing());

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::ToolInvocation {
                phase: ToolPhase::DatabaseCreate,
                code: Some(2),
                ..
            }
        ));
        assert_eq!(runner.phases(), vec![ToolPhase::DatabaseCreate]);
    }

    #[tokio::test]
    async fn test_analyze_failure_is_reported() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let runner = Arc::new(RecordingRunner::new().failing(ToolPhase::DatabaseAnalyze, 1));
        let fetcher = Arc::new(CountingFetcher::failing());

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .run(&request())
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(ToolPhase::DatabaseAnalyze));
    }

    #[tokio::test]
    async fn test_missing_database_is_precondition_error() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let runner = Arc::new(RecordingRunner::new().without_database());
        let fetcher = Arc::new(CountingFetcher::failing());

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .run(&request())
            .await
            .unwrap_err();

        match err {
            ScanError::Precondition { database } => {
                assert_eq!(database, work.path().join("codeql-db-app"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runner.phases(), vec![ToolPhase::DatabaseCreate]);
    }

    #[tokio::test]
    async fn test_database_check_can_be_disabled() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let mut config = scan_config(work.path());
        config.verify_database = false;
        let runner = Arc::new(RecordingRunner::new().without_database());
        let fetcher = Arc::new(CountingFetcher::failing());

        scanner(config, &runner, &fetcher)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_results_file() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        std::fs::write(work.path().join("codeql-results.sarif"), "stale").unwrap();
        let runner = Arc::new(RecordingRunner::new().without_results());
        let fetcher = Arc::new(CountingFetcher::failing());

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::MissingResults { .. }));
        assert!(!work.path().join("codeql-results.sarif").exists());
    }

    #[tokio::test]
    async fn test_overwrite_disabled() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let mut config = scan_config(work.path());
        config.overwrite = false;
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::failing());

        scanner(config, &runner, &fetcher)
            .run(&request())
            .await
            .unwrap();

        assert!(!runner.calls()[0].1.has_arg("--overwrite"));
    }

    #[tokio::test]
    async fn test_pack_install_failure_does_not_abort() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let mut config = scan_config(work.path());
        config.extra_packs = vec![
            ExtraPack::WindowsDriver,
            ExtraPack::Path(PathBuf::from("packs/extra")),
        ];
        let runner = Arc::new(RecordingRunner::new().failing(ToolPhase::PackInstall, 1));
        let fetcher = Arc::new(CountingFetcher::failing());

        let outcome = scanner(config, &runner, &fetcher)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(outcome.packs_installed, 0);
        assert_eq!(
            runner.phases(),
            vec![
                ToolPhase::PackInstall,
                ToolPhase::PackInstall,
                ToolPhase::DatabaseCreate,
                ToolPhase::DatabaseAnalyze
            ]
        );
        let second = &runner.calls()[1].1;
        assert_eq!(
            second.args.last(),
            Some(&OsString::from(work.path().join("packs/extra")))
        );
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let work = tempfile::tempdir().unwrap();
        install_fake_tool(&work.path().join("codeql"));
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::failing());
        let log = EventLog::default();
        let events = log.0.clone();

        scanner(scan_config(work.path()), &runner, &fetcher)
            .with_progress(log)
            .run(&request())
            .await
            .unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "Started",
                "ToolLocated",
                "PhaseStarted",
                "PhaseComplete",
                "PhaseStarted",
                "PhaseComplete",
                "Completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_emits_failed_event() {
        let work = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::failing());
        let log = EventLog::default();
        let events = log.0.clone();

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .with_progress(log)
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Fetch { .. }));
        assert!(runner.calls().is_empty());
        assert_eq!(*events.lock().unwrap(), vec!["Started", "Failed"]);
    }

    #[tokio::test]
    async fn test_interrupt_stops_before_download() {
        let work = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let fetcher = Arc::new(CountingFetcher::serving(bundle_tar_gz("codeql", "codeql")));
        let interrupt = Interrupt::new();
        interrupt.trigger();

        let err = scanner(scan_config(work.path()), &runner, &fetcher)
            .with_interrupt(interrupt)
            .run(&request())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Interrupted));
        assert_eq!(fetcher.calls(), 0);
        assert!(runner.calls().is_empty());
    }
}
