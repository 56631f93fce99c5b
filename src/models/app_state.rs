use crate::services::initialisation::InitOutcome;
use camino::Utf8PathBuf;

/// Progress value reported when initialisation has finished successfully.
pub const PROGRESS_COMPLETE: u8 = 100;

/// A critical error surfaced to the user as a dialog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CriticalReport {
    pub title: String,
    pub message: String,
}

/// Single source of truth for initialisation state.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly - go through [`StateManager`](crate::state::StateManager)
/// so change events reach subscribers:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations with automatic change events
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub workspace_root: Option<Utf8PathBuf>,

    // Runtime state
    pub is_initialising: bool,
    pub current_operation: String,

    // Progress state (0-100)
    pub progress: u8,

    // Results
    pub last_critical: Option<CriticalReport>,
    pub outcome: Option<InitOutcome>,
}

impl AppState {
    /// True once a run reported 100% and finished without a critical error.
    pub fn is_complete(&self) -> bool {
        self.outcome == Some(InitOutcome::Completed) && self.progress == PROGRESS_COMPLETE
    }

    /// Clear everything left over from a previous run, keeping the workspace root.
    pub fn reset_run_state(&mut self) {
        self.is_initialising = false;
        self.current_operation.clear();
        self.progress = 0;
        self.last_critical = None;
        self.outcome = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(!state.is_initialising);
        assert_eq!(state.progress, 0);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_is_complete_requires_full_progress() {
        let mut state = AppState::default();
        state.outcome = Some(InitOutcome::Completed);
        assert!(!state.is_complete());

        state.progress = PROGRESS_COMPLETE;
        assert!(state.is_complete());

        state.outcome = Some(InitOutcome::ValidationFailed);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_reset_run_state_keeps_root() {
        let mut state = AppState {
            workspace_root: Some(Utf8PathBuf::from("/work")),
            is_initialising: true,
            current_operation: "Clearing tmp folder".to_string(),
            progress: 40,
            last_critical: Some(CriticalReport {
                title: "t".to_string(),
                message: "m".to_string(),
            }),
            outcome: Some(InitOutcome::Cancelled),
        };

        state.reset_run_state();

        assert_eq!(state.workspace_root, Some(Utf8PathBuf::from("/work")));
        assert!(!state.is_initialising);
        assert!(state.current_operation.is_empty());
        assert_eq!(state.progress, 0);
        assert!(state.last_critical.is_none());
        assert!(state.outcome.is_none());
    }
}
