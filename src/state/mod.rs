// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for whatever front end is listening.

use crate::models::{AppState, CriticalReport};
use crate::services::initialisation::{InitOutcome, InitialisationReporter};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Subscribers receive these instead of polling the state. Sending never blocks;
/// if nobody is subscribed the event is dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// An initialisation run has started
    InitialisationStarted,

    /// A step of the run has started
    ProgressUpdated { percent: u8, label: String },

    /// The run hit an error the user must see
    CriticalError { title: String, message: String },

    /// The run has finished; `None` means it failed with an unexpected error
    InitialisationFinished { outcome: Option<InitOutcome> },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Implements [`InitialisationReporter`], so a run can report straight into it
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100 event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Get a cloned snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_initialising);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs, and broadcasts the differences.
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if !old.is_initialising && new.is_initialising {
            changes.push(StateChange::InitialisationStarted);
        }

        if old.progress != new.progress || old.current_operation != new.current_operation {
            changes.push(StateChange::ProgressUpdated {
                percent: new.progress,
                label: new.current_operation.clone(),
            });
        }

        if old.last_critical != new.last_critical {
            if let Some(report) = &new.last_critical {
                changes.push(StateChange::CriticalError {
                    title: report.title.clone(),
                    message: report.message.clone(),
                });
            }
        }

        if old.is_initialising && !new.is_initialising {
            changes.push(StateChange::InitialisationFinished {
                outcome: new.outcome,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Mark a new run as started against `workspace_root`
    pub fn start_initialisation(&self, workspace_root: Utf8PathBuf) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_run_state();
            state.workspace_root = Some(workspace_root);
            state.is_initialising = true;
        })
    }

    /// Mark the current run as finished
    pub fn finish_initialisation(&self, outcome: Option<InitOutcome>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_initialising = false;
            state.outcome = outcome;
        })
    }

    /// Reset all run-related state
    pub fn reset_run_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_run_state());

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl InitialisationReporter for StateManager {
    fn progress(&self, percent: u8, label: &str) {
        self.update(|state| {
            state.progress = percent;
            state.current_operation = label.to_string();
        });
    }

    fn critical(&self, title: &str, message: &str) {
        self.update(|state| {
            state.last_critical = Some(CriticalReport {
                title: title.to_string(),
                message: message.to_string(),
            });
        });
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_initialising);
        assert_eq!(state.progress, 0);
        assert!(state.last_critical.is_none());
    }

    #[test]
    fn test_start_emits_started() {
        let manager = StateManager::new();

        let changes = manager.start_initialisation(Utf8PathBuf::from("/work"));

        assert_eq!(changes, vec![StateChange::InitialisationStarted]);
        assert_eq!(manager.read(|s| s.workspace_root.clone()), Some(Utf8PathBuf::from("/work")));
    }

    #[test]
    fn test_progress_report_updates_state() {
        let manager = StateManager::new();

        manager.progress(40, "Clearing result folder");

        let state = manager.snapshot();
        assert_eq!(state.progress, 40);
        assert_eq!(state.current_operation, "Clearing result folder");
    }

    #[test]
    fn test_same_progress_twice_emits_once() {
        let manager = StateManager::new();

        let first = manager.update(|s| s.progress = 20);
        let second = manager.update(|s| s.progress = 20);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_critical_report_emits_event() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.critical("Incorrect decompiler cmd", "details");

        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::CriticalError {
                title: "Incorrect decompiler cmd".to_string(),
                message: "details".to_string(),
            }
        );
    }

    #[test]
    fn test_finish_emits_outcome() {
        let manager = StateManager::new();
        manager.start_initialisation(Utf8PathBuf::from("/work"));

        let changes = manager.finish_initialisation(Some(InitOutcome::Completed));

        assert_eq!(
            changes,
            vec![StateChange::InitialisationFinished {
                outcome: Some(InitOutcome::Completed)
            }]
        );
    }

    #[test]
    fn test_reset_clears_previous_run() {
        let manager = StateManager::new();
        manager.start_initialisation(Utf8PathBuf::from("/work"));
        manager.progress(80, "Checking decompiler/decompiler cmd are correct");
        manager.critical("t", "m");
        manager.finish_initialisation(Some(InitOutcome::ValidationFailed));

        let changes = manager.reset_run_state();

        assert!(matches!(changes.last(), Some(StateChange::StateReset)));
        let state = manager.snapshot();
        assert_eq!(state.progress, 0);
        assert!(state.last_critical.is_none());
        assert!(state.outcome.is_none());
    }
}
