//! MDG Init - prepares the Mod Decompiler GUI workspace from the command line.
//!
//! # Execution Flow
//!
//! 1. Load `MDG Data/MDG Settings.yaml` (plus `MDG_*` environment overrides)
//! 2. Initialize logging → logs/mdg.<date>
//! 3. Create a tokio runtime with 2 worker threads
//! 4. Start a listener thread that prints progress and critical errors
//! 5. Run the initialisation task on a worker; Ctrl-C terminates it (and the decompiler check)
//! 6. Shutdown the runtime and log metrics
//!
//! The workspace root is the current directory. The decompiler check runs against
//! `resources/test_mod.jar` inside it.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use mdg_init::logging::{LogOptions, setup_logging};
use mdg_init::{
    APP_NAME, ConfigManager, InitOutcome, InitialisationTask, Metrics, StateChange, StateManager,
    VERSION, WorkspacePaths,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<ExitCode> {
    let config_manager = ConfigManager::new("MDG Data")?;
    let user_config = config_manager.load_user_config()?;

    let _log_guard = setup_logging(&LogOptions {
        debug_mode: user_config.mdg_settings.debug_mode,
        ..LogOptions::default()
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("mdg-worker")
        .build()?;

    let root = std::env::current_dir().context("Failed to read current directory")?;
    let root = Utf8PathBuf::try_from(root).context("Workspace path is not valid UTF-8")?;

    let config = user_config.to_init_config();
    let metrics = Arc::new(Metrics::new());
    let state_manager = Arc::new(StateManager::new());
    let task = Arc::new(InitialisationTask::new(
        WorkspacePaths::new(&root),
        Arc::clone(&metrics),
    ));

    tracing::info!(
        "Initialising workspace {} (cache={}, deobf={}, decomp={}, check={})",
        root,
        config.cache_enabled,
        config.deobfuscation_stage_enabled,
        config.decompilation_stage_enabled,
        config.decompiler_validation_enabled
    );

    let listener = spawn_state_listener(&state_manager);

    let ctrl_c_task = Arc::clone(&task);
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted - terminating initialisation");
            ctrl_c_task.terminate();
        }
    });

    let run_state = Arc::clone(&state_manager);
    let run_task = Arc::clone(&task);
    let handle = runtime.spawn(async move {
        run_state.start_initialisation(root);
        let result = run_task.run(&config, run_state.as_ref()).await;
        run_state.finish_initialisation(result.as_ref().ok().copied());
        result
    });

    let result = runtime
        .block_on(handle)
        .context("Initialisation task panicked")?;

    if listener.join().is_err() {
        tracing::warn!("State listener thread panicked");
    }

    runtime.shutdown_timeout(Duration::from_secs(5));
    metrics.log_summary();
    tracing::info!("Shutdown complete");

    match result? {
        InitOutcome::Completed => Ok(ExitCode::SUCCESS),
        outcome => {
            tracing::warn!("Initialisation did not complete: {:?}", outcome);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print state changes until the run finishes.
fn spawn_state_listener(state_manager: &StateManager) -> std::thread::JoinHandle<()> {
    let mut rx = state_manager.subscribe();
    std::thread::spawn(move || {
        loop {
            match rx.blocking_recv() {
                Ok(StateChange::ProgressUpdated { percent, label }) => {
                    println!("[{:>3}%] {}", percent, label);
                }
                Ok(StateChange::CriticalError { title, message }) => {
                    eprintln!("\n{}\n{}", title, message);
                }
                Ok(StateChange::InitialisationFinished { .. }) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("State listener skipped {} events", skipped);
                }
            }
        }
    })
}
