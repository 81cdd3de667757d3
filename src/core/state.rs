//! Confirm-then-execute state machine shared by the fill and release flows.
//!
//! `Idle → VolumeSelected → Confirmed → Executing → {Completed | Failed}`.
//! The interactive layer may only drive transitions; it can never reach
//! `Executing` without passing through `Confirmed`, and a finished operation
//! needs a fresh select/confirm cycle before executing again.

#![allow(missing_docs)]

use crate::core::errors::{MdfError, Result};

/// Phase of a single fill or release operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    VolumeSelected,
    Confirmed,
    Executing,
    Completed,
    Failed,
}

impl Phase {
    /// Label used in state-violation errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::VolumeSelected => "VolumeSelected",
            Self::Confirmed => "Confirmed",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// Gate that enforces the confirm-then-execute ordering.
#[derive(Debug)]
pub struct OperationGate {
    phase: Phase,
}

impl Default for OperationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationGate {
    #[must_use]
    pub const fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Record that a volume has been chosen. Valid from `Idle` or after a
    /// finished operation (starting a new cycle).
    pub fn select_volume(&mut self) -> Result<()> {
        match self.phase {
            Phase::Idle | Phase::Completed | Phase::Failed => {
                self.phase = Phase::VolumeSelected;
                Ok(())
            }
            other => Err(violation(other, "select_volume")),
        }
    }

    /// Record the operator's affirmative confirmation.
    pub fn confirm(&mut self) -> Result<()> {
        match self.phase {
            Phase::VolumeSelected => {
                self.phase = Phase::Confirmed;
                Ok(())
            }
            other => Err(violation(other, "confirm")),
        }
    }

    /// Enter `Executing`. Only reachable from `Confirmed`; there is no
    /// retry without reconfirmation.
    pub fn begin(&mut self) -> Result<()> {
        match self.phase {
            Phase::Confirmed => {
                self.phase = Phase::Executing;
                Ok(())
            }
            other => Err(violation(other, "begin")),
        }
    }

    /// Mark the executing operation as completed.
    pub fn complete(&mut self) -> Result<()> {
        match self.phase {
            Phase::Executing => {
                self.phase = Phase::Completed;
                Ok(())
            }
            other => Err(violation(other, "complete")),
        }
    }

    /// Mark the executing operation as failed.
    pub fn fail(&mut self) -> Result<()> {
        match self.phase {
            Phase::Executing => {
                self.phase = Phase::Failed;
                Ok(())
            }
            other => Err(violation(other, "fail")),
        }
    }

    /// Abandon the current cycle and return to `Idle`.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

fn violation(phase: Phase, action: &'static str) -> MdfError {
    MdfError::StateViolation {
        phase: phase.as_str(),
        action,
    }
}
