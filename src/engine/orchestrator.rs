//! Install and delete orchestration.
//!
//! # Install
//!
//! 1. Validate run-wide answers, resolve the selection
//! 2. Run every module's validation pass (nothing has executed yet)
//! 3. For each module in order: plan it against the current answers, then
//!    execute its tasks
//!
//! Planning one module at a time is what lets a downstream module's
//! `plan_install` read values written by upstream tasks in the same run.
//!
//! # Delete
//!
//! The reverse of the install order. Delete tasks that opt in treat a stack
//! that is already gone as success; any other failure stops the run.

use crate::answers::Answers;
use crate::cancel::CancelToken;
use crate::engine::executor::Executor;
use crate::engine::plan::{self, PlanLine};
use crate::engine::resolver;
use crate::engine::RunOutcome;
use crate::error::Result;
use crate::events::EventSink;
use crate::module::{ModuleName, Registry};
use crate::run_state::{RunPhase, RunState};
use crate::stack::StackClient;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Direction {
    Install,
    Delete,
}

/// Drives runs against one registry and one stack client.
pub struct Orchestrator<'a> {
    registry: &'a Registry,
    stacks: &'a dyn StackClient,
    sink: &'a dyn EventSink,
    cancel: CancelToken,
    state: RunState,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a Registry, stacks: &'a dyn StackClient, sink: &'a dyn EventSink) -> Self {
        Self {
            registry,
            stacks,
            sink,
            cancel: CancelToken::new(),
            state: RunState::new(),
        }
    }

    /// Use `cancel` for every subsequent run.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// State of the most recent run
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Install `selected`, threading `answers` through every task.
    ///
    /// On return `answers` holds everything recorded up to the point the run
    /// stopped, including on failure and cancellation.
    pub fn install(&mut self, selected: &[ModuleName], answers: &mut Answers) -> Result<RunOutcome> {
        self.run(Direction::Install, selected, answers)
    }

    /// Delete `selected` in reverse install order.
    pub fn delete(&mut self, selected: &[ModuleName], answers: &mut Answers) -> Result<RunOutcome> {
        self.run(Direction::Delete, selected, answers)
    }

    /// Resolve and plan an install without executing anything.
    pub fn preview_install(&self, selected: &[ModuleName], answers: &Answers) -> Result<Vec<PlanLine>> {
        plan::preview_install(self.registry, selected, answers)
    }

    /// Resolve and plan a delete without executing anything.
    pub fn preview_delete(&self, selected: &[ModuleName], answers: &Answers) -> Result<Vec<PlanLine>> {
        plan::preview_delete(self.registry, selected, answers)
    }

    fn run(
        &mut self,
        direction: Direction,
        selected: &[ModuleName],
        answers: &mut Answers,
    ) -> Result<RunOutcome> {
        self.state = RunState::new();
        self.state.transition_to(RunPhase::Resolving)?;

        let order = match self.prepare(direction, selected, answers) {
            Ok(order) => order,
            Err(err) => {
                self.state.fail()?;
                return Err(err);
            }
        };
        tracing::info!(direction = ?direction, modules = ?order, "starting run");

        let executor = Executor::new(self.stacks, &self.cancel, self.sink);
        for name in &order {
            if self.cancel.is_cancelled() {
                self.state.cancel()?;
                return Ok(RunOutcome::Cancelled);
            }

            self.state.begin_module(name)?;
            let module = plan::module(self.registry, name)?;
            let tasks = match direction {
                Direction::Install => module.plan_install(answers),
                Direction::Delete => module.plan_delete(answers),
            };
            tracing::debug!(module = %name, tasks = tasks.len(), "module planned");

            self.state.transition_to(RunPhase::Executing)?;
            match executor.run(tasks, answers, &mut self.state) {
                RunOutcome::Succeeded => {}
                RunOutcome::Cancelled => {
                    tracing::warn!(module = %name, "run cancelled");
                    self.state.cancel()?;
                    return Ok(RunOutcome::Cancelled);
                }
                failed => {
                    self.state.fail()?;
                    return Ok(failed);
                }
            }
        }

        if direction == Direction::Delete {
            answers.modules.retain(|m| !order.contains(m));
        }
        self.state.transition_to(RunPhase::Completed)?;
        tracing::info!(
            run = self.state.tasks_run(),
            skipped = self.state.tasks_skipped(),
            tolerated = self.state.tasks_tolerated(),
            "run completed"
        );
        Ok(RunOutcome::Succeeded)
    }

    /// Everything that can fail before the first task runs.
    fn prepare(
        &self,
        direction: Direction,
        selected: &[ModuleName],
        answers: &mut Answers,
    ) -> Result<Vec<ModuleName>> {
        answers.validate()?;
        match direction {
            Direction::Install => {
                let order = resolver::resolve(self.registry, selected)?;
                plan::validate_all(self.registry, &order, answers)?;
                for name in &order {
                    if !answers.modules.contains(name) {
                        answers.modules.push(name.clone());
                    }
                }
                Ok(order)
            }
            Direction::Delete => resolver::delete_order(self.registry, selected, &answers.modules),
        }
    }
}
