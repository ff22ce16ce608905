//! Sequential task executor.

use crate::answers::Answers;
use crate::cancel::CancelToken;
use crate::engine::task::{Task, TaskContext};
use crate::engine::RunOutcome;
use crate::events::{EventSink, TaskEvent, TaskEventKind};
use crate::run_state::RunState;
use crate::stack::StackClient;

/// Runs tasks one at a time against a shared `Answers`.
pub struct Executor<'a> {
    stacks: &'a dyn StackClient,
    cancel: &'a CancelToken,
    sink: &'a dyn EventSink,
}

impl<'a> Executor<'a> {
    pub fn new(stacks: &'a dyn StackClient, cancel: &'a CancelToken, sink: &'a dyn EventSink) -> Self {
        Self {
            stacks,
            cancel,
            sink,
        }
    }

    /// Run `tasks` in order.
    ///
    /// Stops at the first unrecovered failure. Cancellation is checked
    /// before every task; a failing action while the token is cancelled is
    /// reported as `Cancelled` rather than as a task failure.
    pub fn run(&self, tasks: Vec<Task>, answers: &mut Answers, state: &mut RunState) -> RunOutcome {
        for task in tasks {
            if self.cancel.is_cancelled() {
                tracing::warn!(module = %task.module(), task = task.title(), "run cancelled before task");
                return RunOutcome::Cancelled;
            }

            let module = task.module().clone();
            let title = task.title().to_string();
            let event = |kind| TaskEvent::new(&module, &title, kind);

            if task.should_skip(answers) {
                self.sink.emit(&event(TaskEventKind::Skipped));
                state.count_skipped();
                continue;
            }

            self.sink.emit(&event(TaskEventKind::Started));
            let tolerate_not_found = task.tolerates_not_found();
            let mut ctx = TaskContext::new(answers, &module, self.stacks, self.cancel);
            match task.run(&mut ctx) {
                Ok(()) => {
                    self.sink.emit(&event(TaskEventKind::Succeeded));
                    state.count_run();
                }
                Err(err) if tolerate_not_found && err.is_not_found() => {
                    self.sink.emit(&event(TaskEventKind::NotFoundTolerated));
                    state.count_tolerated();
                }
                Err(err) if err.is_cancelled() || self.cancel.is_cancelled() => {
                    self.sink.emit(&event(TaskEventKind::Cancelled));
                    return RunOutcome::Cancelled;
                }
                Err(err) => {
                    self.sink.emit(&event(TaskEventKind::Failed(err.to_string())));
                    return RunOutcome::Failed {
                        module,
                        task: title,
                        cause: err,
                    };
                }
            }
        }
        RunOutcome::Succeeded
    }
}
