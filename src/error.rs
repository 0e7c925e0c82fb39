use crate::model::RunState;

/// Failures surfaced by the run controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("a run is already active ({0})")]
    AlreadyRunning(RunState),

    /// Cooperative cancellation signal. Workers should wind down and return.
    #[error("stopped by user")]
    StoppedByUser,

    #[error("cannot {command} while {state}")]
    InvalidTransition {
        command: &'static str,
        state: RunState,
    },
}
