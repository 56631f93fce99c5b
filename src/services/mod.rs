//! Services module - workspace preparation and decompiler validation.
//!
//! The services have no UI dependencies. Progress and errors leave through the
//! [`InitialisationReporter`] trait, so any front end (or a test mock) can listen.
//!
//! # Components
//!
//! - [`InitialisationTask`]: the cancellable background run. It clears temp folders,
//!   reconciles the result folders against `cache.json`, recreates the folder skeleton,
//!   and optionally test-runs the decompiler command.
//! - [`Workspace`] / [`WorkspacePaths`]: folder utility over the fixed directory layout,
//!   plus [`ModCache`] for the decompilation cache.
//! - [`DecompilerValidator`]: formats the command template, runs it through the platform
//!   shell, analyses its output, and checks that it produced files.
//! - [`process`]: process-group setup and process-tree termination.
//!
//! # Usage Example
//!
//! ```ignore
//! use mdg_init::services::{InitialisationTask, WorkspacePaths};
//!
//! let task = Arc::new(InitialisationTask::new(WorkspacePaths::new("."), metrics));
//! let outcome = task.run(&user_config.to_init_config(), state_manager.as_ref()).await?;
//!
//! // From another thread, e.g. a Stop button:
//! task.terminate();
//! ```

pub mod decompiler;
pub mod initialisation;
pub mod process;
pub mod workspace;

pub use decompiler::{
    DecompilerCommand, DecompilerError, DecompilerValidator, OutputAnalyser, RunningProcess,
    TemplateError, ValidationReport, format_command,
};
pub use initialisation::{
    DECOMPILER_ERROR_TITLE, InitOutcome, InitialisationReporter, InitialisationTask,
};
pub use workspace::{CACHE_FILE_NAME, ModCache, Workspace, WorkspaceError, WorkspacePaths};
