//! Update Session State Machine
//!
//! Explicit phases for a single update attempt, plus the exit contract
//! reported back to the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current phase of the update attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing has happened yet
    Idle,
    /// Fetching the remote manifest
    CheckingVersion,
    /// Remote version equals the local record
    UpToDate,
    /// Waiting for the user to accept the update
    AwaitingConfirmation,
    /// Streaming the package into the staging file
    Downloading { progress: f64 },
    /// Hashing the staging file
    Verifying,
    /// Unpacking and replacing files
    Installing,
    /// Install committed
    Finalized,
    /// Attempt ended with an error
    Failed { reason: String },
    /// User declined or cancelled
    Cancelled,
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UpToDate | Self::Finalized | Self::Failed { .. } | Self::Cancelled
        )
    }
}

/// Process exit contract with the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// No update available or the user declined
    NoUpdate,
    /// A new version was installed
    Installed,
    /// The user cancelled an in-progress update
    Cancelled,
    /// An error occurred
    Error,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            Self::NoUpdate => 0,
            Self::Installed => 1,
            Self::Cancelled => 2,
            Self::Error => -1,
        }
    }
}

/// How the attempt ended
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    UpToDate,
    Skipped { version: String },
    Declined,
    Installed {
        version: String,
        /// Set when the version record could not be rewritten
        persistence_error: Option<String>,
    },
    Cancelled,
    Failed { kind: String, message: String },
}

impl SessionOutcome {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::UpToDate | Self::Skipped { .. } | Self::Declined => ExitStatus::NoUpdate,
            Self::Installed { .. } => ExitStatus::Installed,
            Self::Cancelled => ExitStatus::Cancelled,
            Self::Failed { .. } => ExitStatus::Error,
        }
    }
}

/// State owned by the orchestrator for one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub current_version: String,
    pub target_version: Option<String>,
    pub cancelled: bool,
    pub phase: SessionPhase,
    pub result: Option<SessionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
            target_version: None,
            cancelled: false,
            phase: SessionPhase::Idle,
            result: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn start_checking(&mut self) {
        self.transition(SessionPhase::CheckingVersion);
    }

    pub fn set_target(&mut self, version: &str) {
        self.target_version = Some(version.to_string());
    }

    pub fn await_confirmation(&mut self) {
        self.transition(SessionPhase::AwaitingConfirmation);
    }

    pub fn start_downloading(&mut self) {
        self.transition(SessionPhase::Downloading { progress: 0.0 });
    }

    /// Progress only moves forward while downloading
    pub fn update_progress(&mut self, value: f64) {
        if let SessionPhase::Downloading { progress } = &mut self.phase {
            if value > *progress {
                *progress = value;
            }
        }
    }

    pub fn start_verifying(&mut self) {
        self.transition(SessionPhase::Verifying);
    }

    pub fn start_installing(&mut self) {
        self.transition(SessionPhase::Installing);
    }

    pub fn mark_cancel_requested(&mut self) {
        self.cancelled = true;
    }

    /// Record the final outcome and move to the matching terminal phase
    pub fn finish(&mut self, outcome: SessionOutcome) {
        let phase = match &outcome {
            SessionOutcome::UpToDate | SessionOutcome::Skipped { .. } => SessionPhase::UpToDate,
            SessionOutcome::Declined | SessionOutcome::Cancelled => SessionPhase::Cancelled,
            SessionOutcome::Installed { .. } => SessionPhase::Finalized,
            SessionOutcome::Failed { kind, .. } => SessionPhase::Failed {
                reason: kind.clone(),
            },
        };
        self.transition(phase);
        self.result = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    fn transition(&mut self, next: SessionPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "session phase change");
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_default() {
        let state = SessionState::new("1.0.0");
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.target_version.is_none());
        assert!(state.result.is_none());
    }

    #[test]
    fn test_state_transitions() {
        let mut state = SessionState::new("1.0.0");

        state.start_checking();
        assert!(matches!(state.phase, SessionPhase::CheckingVersion));

        state.set_target("1.2.0");
        state.await_confirmation();
        assert!(matches!(state.phase, SessionPhase::AwaitingConfirmation));

        state.start_downloading();
        state.update_progress(0.5);
        state.update_progress(0.3);
        assert_eq!(state.phase, SessionPhase::Downloading { progress: 0.5 });

        state.start_verifying();
        state.start_installing();
        state.finish(SessionOutcome::Installed {
            version: "1.2.0".into(),
            persistence_error: None,
        });
        assert_eq!(state.phase, SessionPhase::Finalized);
        assert!(state.phase.is_terminal());
        assert_eq!(state.result.as_ref().map(|r| r.exit_status()), Some(ExitStatus::Installed));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::NoUpdate.code(), 0);
        assert_eq!(ExitStatus::Installed.code(), 1);
        assert_eq!(ExitStatus::Cancelled.code(), 2);
        assert_eq!(ExitStatus::Error.code(), -1);
    }

    #[test]
    fn test_declined_is_not_an_error() {
        let mut state = SessionState::new("1.0.0");
        state.finish(SessionOutcome::Declined);
        assert_eq!(state.phase, SessionPhase::Cancelled);
        assert_eq!(SessionOutcome::Declined.exit_status(), ExitStatus::NoUpdate);
        assert_eq!(SessionOutcome::Cancelled.exit_status(), ExitStatus::Cancelled);
    }
}
