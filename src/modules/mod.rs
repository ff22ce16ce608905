//! Built-in infrastructure modules.
//!
//! | Module             | Mandatory | Optional           |
//! |--------------------|-----------|--------------------|
//! | `vpc`              |           |                    |
//! | `kms`              |           |                    |
//! | `deploymentHelper` |           | `vpc`              |
//! | `eventBus`         | `kms`     | `deploymentHelper` |
//!
//! Every module deploys one or more stacks named
//! `modstack-<component>-<environment>` and records the outputs later
//! modules need in its own `Answers` namespace. The task builders below are
//! shared so every deploy is fingerprinted and every delete tolerates a stack
//! that is already gone.

pub mod deployment_helper;
pub mod event_bus;
pub mod kms;
pub mod vpc;

use std::path::{Path, PathBuf};

use crate::answers::Answers;
use crate::engine::Task;
use crate::error::Result;
use crate::module::{ModuleName, Registry};
use crate::stack::{require_output, DeployRequest, StackError};

pub use deployment_helper::DeploymentHelperModule;
pub use event_bus::EventBusModule;
pub use kms::KmsModule;
pub use vpc::VpcModule;

/// Stack name prefix shared by every built-in module.
pub const STACK_PREFIX: &str = "modstack";

/// Inputs every built-in module is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSettings {
    pub environment: String,
    /// Directory holding each component's `infrastructure/` templates
    pub source_root: PathBuf,
}

impl ModuleSettings {
    pub fn new(environment: impl Into<String>, source_root: impl Into<PathBuf>) -> Self {
        Self {
            environment: environment.into(),
            source_root: source_root.into(),
        }
    }

    /// `modstack-<component>-<environment>`
    pub fn stack_name(&self, component: &str) -> String {
        format!("{}-{}-{}", STACK_PREFIX, component, self.environment)
    }

    /// Working directory for one component's stack CLI calls.
    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.source_root.join(component)
    }
}

/// Registry of every built-in module, in declaration order.
pub fn builtin_registry(settings: &ModuleSettings) -> Result<Registry> {
    Registry::new()
        .with(VpcModule::new(settings))?
        .with(KmsModule::new(settings))?
        .with(DeploymentHelperModule::new(settings))?
        .with(EventBusModule::new(settings))
}

// ============================================================================
// Shared task builders
// ============================================================================

/// Deploy `request`, recording its fingerprint under the owner's namespace.
///
/// Skips at execution time when the recorded fingerprint already matches, so
/// a re-run against unchanged answers deploys nothing.
pub(crate) fn deploy_task(module: &ModuleName, request: DeployRequest) -> Task {
    let title = format!("Deploying stack '{}'", request.stack_name);
    let fingerprint = request.fingerprint();
    let recorded = fingerprint.clone();
    let owner = module.clone();
    let stack = request.stack_name.clone();

    Task::new(module, title, move |ctx| {
        let status = ctx.stacks().deploy_or_update(&request, ctx.cancel())?;
        tracing::info!(stack = %request.stack_name, %status, "stack deployed");
        ctx.own().record_stack(&request.stack_name, fingerprint);
        Ok(())
    })
    .skip_if(move |answers| is_deployed(answers, &owner, &stack, &recorded))
}

fn is_deployed(answers: &Answers, owner: &ModuleName, stack: &str, fingerprint: &str) -> bool {
    answers
        .namespace(owner.as_str())
        .and_then(|ns| ns.stack_fingerprint(stack))
        == Some(fingerprint)
}

/// Read `stack`'s outputs into the owner's namespace.
///
/// `mapping` pairs an output key with the answers key it is stored under.
/// Every listed output is required.
pub(crate) fn harvest_task(
    module: &ModuleName,
    stack: String,
    mapping: &'static [(&'static str, &'static str)],
) -> Task {
    let title = format!("Retrieving config from stack '{}'", stack);
    Task::new(module, title, move |ctx| {
        let outputs = ctx.stacks().describe(&stack, ctx.cancel())?;
        for (output, key) in mapping {
            let value = require_output(&outputs, &stack, output)?.to_string();
            tracing::debug!(stack = %stack, output, value = %value, "harvested output");
            ctx.own().set(*key, value);
        }
        Ok(())
    })
}

/// Delete `stack`, treating an absent stack as already deleted.
///
/// On success the stack's fingerprint and the listed answers keys are
/// cleared from the owner's namespace.
pub(crate) fn delete_task(module: &ModuleName, stack: String, clears: &'static [&'static str]) -> Task {
    let title = format!("Deleting stack '{}'", stack);
    Task::new(module, title, move |ctx| {
        let result = ctx.stacks().delete(&stack, ctx.cancel());
        if matches!(result, Ok(()) | Err(StackError::NotFound { .. })) {
            let own = ctx.own();
            own.forget_stack(&stack);
            for key in clears {
                own.remove(key);
            }
        }
        result
    })
    .tolerate_not_found()
}

/// Template path relative to a component directory.
pub(crate) fn template(file: &str) -> PathBuf {
    Path::new("infrastructure").join(file)
}
