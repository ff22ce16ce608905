//! Error handling module for modstack
//!
//! Provides the crate-wide error type using thiserror. Errors returned from
//! this type are all raised *before* any task runs, or describe why a run
//! could not be set up. Failures of individual tasks during execution are
//! reported through [`crate::engine::RunOutcome`] instead.

use thiserror::Error;

use crate::module::ModuleName;
use crate::run_state::RunTransitionError;

/// Main error type for modstack
#[derive(Error, Debug)]
pub enum InstallerError {
    /// A module's validation pass rejected the current answers
    #[error("Configuration error in module '{module}': {reason}")]
    Configuration { module: ModuleName, reason: String },

    /// Run-wide answers (environment, region) are invalid
    #[error("Configuration error: {0}")]
    Answers(String),

    /// A selected module is not present in the registry
    #[error("Unknown module '{0}'")]
    UnknownModule(ModuleName),

    /// A module declares a mandatory dependency that is not registered
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency {
        module: ModuleName,
        dependency: ModuleName,
    },

    /// A mandatory dependency is registered but not part of the selection
    #[error("Module '{module}' requires module '{dependency}', which is not selected")]
    MissingDependency {
        module: ModuleName,
        dependency: ModuleName,
    },

    /// The dependency graph contains a cycle
    #[error("Cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<ModuleName> },

    /// Two modules registered under the same name
    #[error("Module '{0}' is registered more than once")]
    DuplicateModule(ModuleName),

    /// A module selected for deletion is still needed by an installed module
    /// that is not being deleted
    #[error("Module '{module}' is still required by installed module '{dependent}'")]
    RequiredBy {
        module: ModuleName,
        dependent: ModuleName,
    },

    /// Run state machine misuse
    #[error("Run state error: {0}")]
    RunState(#[from] RunTransitionError),
}

/// Result type alias for modstack operations
pub type Result<T> = std::result::Result<T, InstallerError>;

fn format_cycle(cycle: &[ModuleName]) -> String {
    cycle
        .iter()
        .map(ModuleName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

// Convenient error constructors
impl InstallerError {
    /// Create a module configuration error
    pub fn configuration(module: &ModuleName, reason: impl Into<String>) -> Self {
        Self::Configuration {
            module: module.clone(),
            reason: reason.into(),
        }
    }

    /// Create a run-wide answers error
    pub fn answers(reason: impl Into<String>) -> Self {
        Self::Answers(reason.into())
    }

    /// Returns true for errors that mean the caller's input is wrong, as
    /// opposed to an environmental failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::Answers(_)
                | Self::UnknownModule(_)
                | Self::UnknownDependency { .. }
                | Self::MissingDependency { .. }
                | Self::RequiredBy { .. }
                | Self::DuplicateModule(_)
        )
    }
}
