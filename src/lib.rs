// MDG Init - workspace initialisation for the Mod Decompiler GUI
//
// This is the library crate containing the initialisation logic and data structures.
// The binary crate (main.rs) runs it headless from the command line.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppState, InitConfig, UserConfig};
pub use services::{InitOutcome, InitialisationReporter, InitialisationTask, WorkspacePaths};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
