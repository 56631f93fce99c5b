use crate::metrics::Metrics;
use crate::models::{InitConfig, PROGRESS_COMPLETE};
use crate::services::decompiler::{DecompilerError, DecompilerValidator, RunningProcess};
use crate::services::workspace::{Workspace, WorkspacePaths};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Title of the dialog shown when the decompiler check fails
pub const DECOMPILER_ERROR_TITLE: &str = "Incorrect decompiler cmd";

/// Receives progress and critical errors from an initialisation run
///
/// Calls are fire-and-forget: implementations must not block the run.
#[cfg_attr(test, mockall::automock)]
pub trait InitialisationReporter: Send + Sync {
    /// Percentages are non-decreasing within a run.
    fn progress(&self, percent: u8, label: &str);

    /// Called at most once per run, right before it stops early.
    fn critical(&self, title: &str, message: &str);
}

/// How an initialisation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Completed,
    ValidationFailed,
    Cancelled,
}

/// Background unit of work that prepares the workspace
///
/// Holds a cancellation token and the pid of the decompiler check, if one is
/// running. Share it behind an `Arc` so another thread can call
/// [`terminate`](Self::terminate) while [`run`](Self::run) is in flight.
///
/// A task is single-use once terminated: the token stays cancelled, so every later
/// [`run`](Self::run) stops with [`InitOutcome::Cancelled`] after the first step.
/// Create a new task for the next run.
pub struct InitialisationTask {
    workspace: Workspace,
    cancel: CancellationToken,
    running: Arc<RunningProcess>,
    metrics: Arc<Metrics>,
}

impl InitialisationTask {
    pub fn new(paths: WorkspacePaths, metrics: Arc<Metrics>) -> Self {
        Self {
            workspace: Workspace::new(paths),
            cancel: CancellationToken::new(),
            running: Arc::new(RunningProcess::new()),
            metrics,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the run, then kill the decompiler check (with its children) if it is running.
    pub fn terminate(&self) {
        self.cancel.cancel();
        match self.running.kill() {
            Ok(true) => tracing::info!("Terminated running decompiler check"),
            Ok(false) => {}
            Err(e) => tracing::warn!("Failed to kill decompiler check: {}", e),
        }
    }

    /// Prepare the workspace for `config`.
    ///
    /// Filesystem failures are returned as errors. A failed decompiler check is
    /// reported through `reporter.critical` and yields [`InitOutcome::ValidationFailed`].
    pub async fn run(
        &self,
        config: &InitConfig,
        reporter: &dyn InitialisationReporter,
    ) -> Result<InitOutcome> {
        self.metrics.record_run_started();
        let outcome = self.run_steps(config, reporter).await;

        match &outcome {
            Ok(InitOutcome::Completed) => self.metrics.record_run_completed(),
            Ok(InitOutcome::ValidationFailed) => self.metrics.record_validation_failed(),
            Ok(InitOutcome::Cancelled) => {
                tracing::warn!("Initialisation cancelled");
                self.metrics.record_run_cancelled();
            }
            Err(e) => tracing::error!("Initialisation failed: {:#}", e),
        }

        outcome
    }

    async fn run_steps(
        &self,
        config: &InitConfig,
        reporter: &dyn InitialisationReporter,
    ) -> Result<InitOutcome> {
        let paths = self.workspace.paths();

        reporter.progress(20, "Clearing tmp folder");
        self.workspace.clear_temp_folders()?;
        tracing::info!("Cleared tmp folders.");
        if self.is_cancelled() {
            return Ok(InitOutcome::Cancelled);
        }

        reporter.progress(40, "Clearing result folder");
        if config.cache_enabled {
            let pruned = self.workspace.reconcile_result_folders(config)?;
            self.metrics.record_mods_pruned(pruned.len());
        } else {
            self.workspace.clear_result_folders()?;
        }
        tracing::info!("Cleared result folders.");
        if self.is_cancelled() {
            return Ok(InitOutcome::Cancelled);
        }

        reporter.progress(50, "Creating new folders");
        self.workspace.init_folders(config)?;
        tracing::info!("Created new folders.");
        if self.is_cancelled() {
            return Ok(InitOutcome::Cancelled);
        }

        if config.decompiler_validation_enabled {
            reporter.progress(80, "Checking decompiler/decompiler cmd are correct");
            tracing::info!("Checking decompiler/decompiler cmd are correct");
            self.workspace.create_folder(&paths.decompiler_test_dir)?;

            let validator = DecompilerValidator::new(Arc::clone(&self.running));
            let result = validator
                .validate(
                    &config.decompiler_command_template,
                    &paths.test_mod_path,
                    &paths.decompiler_test_dir,
                    config.validation_timeout,
                    &self.cancel,
                )
                .await;

            match result {
                Ok(report) => {
                    self.metrics.record_validation_time(report.duration);
                    tracing::info!("Checked decompiler/decompiler cmd are correct successfully.");
                }
                Err(DecompilerError::Cancelled) => return Ok(InitOutcome::Cancelled),
                Err(e) if self.is_cancelled() => {
                    tracing::debug!("Decompiler check ended after terminate: {}", e);
                    return Ok(InitOutcome::Cancelled);
                }
                Err(e) => {
                    tracing::error!("Decompiler check failed: {}", e);
                    let message = decompiler_failure_message(&config.decompiler_command_template, &e);
                    reporter.critical(DECOMPILER_ERROR_TITLE, &message);
                    return Ok(InitOutcome::ValidationFailed);
                }
            }
        }

        if self.is_cancelled() {
            return Ok(InitOutcome::Cancelled);
        }
        reporter.progress(PROGRESS_COMPLETE, "Initialisation complete");
        tracing::info!("Initialisation completed.");
        Ok(InitOutcome::Completed)
    }
}

/// User-facing explanation of a failed decompiler check.
pub fn decompiler_failure_message(template: &str, error: &DecompilerError) -> String {
    let mut message = String::from(
        "With this decompiler/decompiler cmd program won't work.\n\
         This message indicates that {path_to_jar} is not decompiled to {out_path}.\n\
         Check decompiler/decompiler cmd: path, syntax, etc. And try again.\n\
         Open the latest log for more details.\n",
    );

    message.push_str(&format!("\nCommand: {}\nError: {}\n", template, error));

    if let DecompilerError::NoOutput { captured, .. } = error {
        if !captured.is_empty() {
            message.push_str("\nDecompiler output:\n");
            for line in captured {
                message.push_str(line);
                message.push('\n');
            }
        }
    }

    message
}
