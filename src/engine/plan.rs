//! Install and delete plan building.
//!
//! A plan is the flat, ordered concatenation of every module's tasks. During
//! a real run the orchestrator plans one module at a time so each module sees
//! what upstream tasks wrote; the eager builders here produce the same
//! sequence against a fixed `Answers`, which is what previews and dry runs
//! show.

use std::fmt;

use crate::answers::Answers;
use crate::engine::resolver;
use crate::engine::task::Task;
use crate::error::{InstallerError, Result};
use crate::module::{InstallModule, ModuleName, Registry};

/// Validate and plan one module for install.
pub fn plan_module_install(module: &dyn InstallModule, answers: &Answers) -> Result<Vec<Task>> {
    module.validate(answers)?;
    let tasks = module.plan_install(answers);
    tracing::debug!(module = %module.name(), tasks = tasks.len(), "planned install");
    Ok(tasks)
}

/// Run every module's validation pass, in order, before anything executes.
pub fn validate_all(registry: &Registry, order: &[ModuleName], answers: &Answers) -> Result<()> {
    for name in order {
        module(registry, name)?.validate(answers)?;
    }
    Ok(())
}

/// Flat install plan for an already-resolved `order`.
pub fn build_install_plan(
    registry: &Registry,
    order: &[ModuleName],
    answers: &Answers,
) -> Result<Vec<Task>> {
    let mut plan = Vec::new();
    for name in order {
        plan.extend(plan_module_install(module(registry, name)?, answers)?);
    }
    Ok(plan)
}

/// Flat delete plan. `order` must already be the delete order.
pub fn build_delete_plan(
    registry: &Registry,
    order: &[ModuleName],
    answers: &Answers,
) -> Result<Vec<Task>> {
    let mut plan = Vec::new();
    for name in order {
        plan.extend(module(registry, name)?.plan_delete(answers));
    }
    Ok(plan)
}

pub(crate) fn module<'r>(registry: &'r Registry, name: &ModuleName) -> Result<&'r dyn InstallModule> {
    registry
        .get(name.as_str())
        .ok_or_else(|| InstallerError::UnknownModule(name.clone()))
}

/// One line of a plan preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine {
    pub module: ModuleName,
    pub title: String,
    /// The skip predicate holds against the answers the preview was built from
    pub skipped: bool,
    pub tolerates_not_found: bool,
}

impl fmt::Display for PlanLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.module, self.title)?;
        if self.skipped {
            f.write_str(" (skip)")?;
        }
        if self.tolerates_not_found {
            f.write_str(" (ok if absent)")?;
        }
        Ok(())
    }
}

/// Resolve, validate and plan an install, then describe it.
pub fn preview_install(
    registry: &Registry,
    selected: &[ModuleName],
    answers: &Answers,
) -> Result<Vec<PlanLine>> {
    answers.validate()?;
    let order = resolver::resolve(registry, selected)?;
    let tasks = build_install_plan(registry, &order, answers)?;
    Ok(preview(&tasks, answers))
}

/// Resolve and plan a delete, then describe it.
pub fn preview_delete(
    registry: &Registry,
    selected: &[ModuleName],
    answers: &Answers,
) -> Result<Vec<PlanLine>> {
    answers.validate()?;
    let order = resolver::delete_order(registry, selected, &answers.modules)?;
    let tasks = build_delete_plan(registry, &order, answers)?;
    Ok(preview(&tasks, answers))
}

/// Describe a plan without running it.
pub fn preview(tasks: &[Task], answers: &Answers) -> Vec<PlanLine> {
    tasks
        .iter()
        .map(|task| PlanLine {
            module: task.module().clone(),
            title: task.title().to_string(),
            skipped: task.should_skip(answers),
            tolerates_not_found: task.tolerates_not_found(),
        })
        .collect()
}
