//! Run State Machine
//!
//! Authoritative record of where an install or delete run is. The
//! orchestrator drives it; callers read it for progress reporting.
//!
//! # Phase Flow
//!
//! ```text
//! NotStarted
//!     ↓
//! Resolving
//!     ↓
//! Planning ⇄ Executing      (one round trip per module)
//!     ↓
//! Completed
//!
//! (Any non-terminal phase can transition to Failed or Cancelled)
//! ```

use std::fmt;
use std::time::Instant;
use thiserror::Error;

use crate::module::ModuleName;

/// Phases of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Nothing has happened yet
    NotStarted,
    /// Ordering the selected modules
    Resolving,
    /// Validating a module and building its tasks
    Planning,
    /// Running a module's tasks
    Executing,
    /// Every task ran or was skipped (terminal)
    Completed,
    /// A task or the planning pass failed (terminal)
    Failed,
    /// Stopped by the cancel token (terminal)
    Cancelled,
}

impl RunPhase {
    /// Returns true for Completed, Failed and Cancelled
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `to` is a legal successor of this phase.
    ///
    /// Failure and cancellation are handled separately by
    /// [`RunState::fail`] and [`RunState::cancel`].
    pub const fn can_advance_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::NotStarted, Self::Resolving)
                | (Self::Resolving, Self::Planning)
                | (Self::Resolving, Self::Completed)
                | (Self::Planning, Self::Executing)
                | (Self::Executing, Self::Planning)
                | (Self::Executing, Self::Completed)
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Resolving => "Resolving dependencies",
            Self::Planning => "Planning",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors that can occur during phase transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunTransitionError {
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },

    #[error("Cannot transition from terminal phase {from}")]
    FromTerminalPhase { from: RunPhase },
}

/// Progress of one run.
#[derive(Debug, Clone)]
pub struct RunState {
    current: RunPhase,
    current_module: Option<ModuleName>,
    /// Phase the run was in when it failed or was cancelled
    stopped_at: Option<RunPhase>,
    history: Vec<(RunPhase, Instant)>,
    tasks_run: usize,
    tasks_skipped: usize,
    tasks_tolerated: usize,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: RunPhase::NotStarted,
            current_module: None,
            stopped_at: None,
            history: Vec::new(),
            tasks_run: 0,
            tasks_skipped: 0,
            tasks_tolerated: 0,
        }
    }

    #[inline]
    pub fn phase(&self) -> RunPhase {
        self.current
    }

    /// Module currently being planned or executed
    pub fn current_module(&self) -> Option<&ModuleName> {
        self.current_module.as_ref()
    }

    #[inline]
    pub fn stopped_at(&self) -> Option<RunPhase> {
        self.stopped_at
    }

    pub fn history(&self) -> &[(RunPhase, Instant)] {
        &self.history
    }

    pub fn tasks_run(&self) -> usize {
        self.tasks_run
    }

    pub fn tasks_skipped(&self) -> usize {
        self.tasks_skipped
    }

    /// Delete tasks that found their target already gone
    pub fn tasks_tolerated(&self) -> usize {
        self.tasks_tolerated
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current == RunPhase::Completed
    }

    /// Move to the next phase.
    ///
    /// # Errors
    ///
    /// - `FromTerminalPhase` if the run already ended
    /// - `InvalidTransition` if `to` does not follow the current phase
    pub fn transition_to(&mut self, to: RunPhase) -> Result<RunPhase, RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalPhase { from: self.current });
        }
        if !self.current.can_advance_to(to) {
            return Err(RunTransitionError::InvalidTransition {
                from: self.current,
                to,
            });
        }
        if to == RunPhase::Completed {
            self.current_module = None;
        }
        self.record(to);
        Ok(to)
    }

    /// Enter `Planning` for `module`.
    pub fn begin_module(&mut self, module: &ModuleName) -> Result<(), RunTransitionError> {
        self.transition_to(RunPhase::Planning)?;
        self.current_module = Some(module.clone());
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), RunTransitionError> {
        self.stop(RunPhase::Failed)
    }

    pub fn cancel(&mut self) -> Result<(), RunTransitionError> {
        self.stop(RunPhase::Cancelled)
    }

    pub(crate) fn count_run(&mut self) {
        self.tasks_run += 1;
    }

    pub(crate) fn count_skipped(&mut self) {
        self.tasks_skipped += 1;
    }

    pub(crate) fn count_tolerated(&mut self) {
        self.tasks_tolerated += 1;
    }

    fn stop(&mut self, to: RunPhase) -> Result<(), RunTransitionError> {
        if self.current.is_terminal() {
            return Err(RunTransitionError::FromTerminalPhase { from: self.current });
        }
        self.stopped_at = Some(self.current);
        self.record(to);
        Ok(())
    }

    fn record(&mut self, phase: RunPhase) {
        self.history.push((phase, Instant::now()));
        self.current = phase;
    }
}
