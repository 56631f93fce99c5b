//! Data models for the workspace initialiser.
//!
//! - [`AppState`]: runtime state of the current initialisation run (progress, outcome, last error)
//! - [`UserConfig`]: user preferences loaded from `MDG Settings.yaml`
//! - [`InitConfig`]: the typed, immutable configuration handed to one run
//!
//! `UserConfig` is the string-keyed, serialisable form; [`UserConfig::to_init_config`] is the
//! single place where it becomes an [`InitConfig`].

pub mod app_state;
pub mod config;

pub use app_state::{AppState, CriticalReport, PROGRESS_COMPLETE};
pub use config::{DEFAULT_DECOMPILER_COMMAND, InitConfig, MdgSettings, UserConfig};
