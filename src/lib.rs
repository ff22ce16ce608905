//! modstack library
//!
//! Dependency resolution and orchestration for installing and tearing down
//! sets of interdependent infrastructure modules.

pub mod answers;
pub mod cancel;
pub mod cli;
pub mod engine;
pub mod error;
pub mod events;
pub mod module;
pub mod modules;
pub mod process_guard;
pub mod run_state;
pub mod stack;
pub mod types;

// Re-export main types for convenience
pub use answers::{Answers, Namespace};
pub use cancel::CancelToken;
pub use engine::plan::PlanLine;
pub use engine::resolver::{delete_order, expand_selection, resolve};
pub use engine::{Orchestrator, RunOutcome, Task, TaskContext};
pub use error::{InstallerError, Result};
pub use events::{EventSink, RecordingSink, TaskEvent, TaskEventKind, TracingSink};
pub use module::{InstallModule, ModuleInfo, ModuleName, Registry};
pub use modules::{builtin_registry, ModuleSettings};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use run_state::{RunPhase, RunState, RunTransitionError};
pub use stack::command::CommandStackClient;
pub use stack::memory::{MemoryStackClient, StackOp};
pub use stack::{DeployRequest, StackClient, StackError, StackOutputs};
pub use types::{Capability, DeployStatus};
