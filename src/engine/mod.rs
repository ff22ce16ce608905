//! Engine modules: the "brain" that turns a module selection into ordered,
//! executed work.
//!
//! The engine sits between the registry (what can be installed) and the
//! stack client (how a stack is deployed). It resolves an order, plans each
//! module's tasks and runs them.

pub mod executor;
pub mod orchestrator;
pub mod plan;
pub mod resolver;
pub mod task;

use crate::module::ModuleName;
use crate::stack::StackError;

pub use orchestrator::Orchestrator;
pub use task::{Task, TaskContext};

/// How a run that got as far as executing tasks ended.
///
/// Errors found before any task runs (bad answers, unknown modules, cycles,
/// failed validation) are returned as `Err` instead.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every task ran, was skipped, or tolerated a missing target
    Succeeded,
    /// A task failed; later tasks were not attempted
    Failed {
        module: ModuleName,
        task: String,
        cause: StackError,
    },
    /// The cancel token fired; later tasks were not attempted
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed { .. } => 1,
            Self::Cancelled => 130,
        }
    }
}
