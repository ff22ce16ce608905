//! Units of work and the handle their actions run against.

use std::fmt;

use crate::answers::{Answers, Namespace};
use crate::cancel::CancelToken;
use crate::module::ModuleName;
use crate::stack::{StackClient, StackError};

type SkipPredicate = Box<dyn Fn(&Answers) -> bool>;
type TaskAction = Box<dyn FnOnce(&mut TaskContext<'_>) -> Result<(), StackError>>;

/// One step of a plan.
///
/// The skip predicate is evaluated by the executor against the *current*
/// answers immediately before the action would run, so it sees everything
/// earlier tasks wrote.
pub struct Task {
    title: String,
    module: ModuleName,
    skip: Option<SkipPredicate>,
    action: TaskAction,
    tolerate_not_found: bool,
}

impl Task {
    pub fn new<F>(module: &ModuleName, title: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(&mut TaskContext<'_>) -> Result<(), StackError> + 'static,
    {
        Self {
            title: title.into(),
            module: module.clone(),
            skip: None,
            action: Box::new(action),
            tolerate_not_found: false,
        }
    }

    /// Skip the task when `predicate` holds at execution time.
    ///
    /// Calling this more than once skips when any predicate holds.
    pub fn skip_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Answers) -> bool + 'static,
    {
        let combined: SkipPredicate = match self.skip.take() {
            Some(previous) => Box::new(move |answers: &Answers| previous(answers) || predicate(answers)),
            None => Box::new(predicate),
        };
        self.skip = Some(combined);
        self
    }

    /// Count a `NotFound` from the action as success.
    pub fn tolerate_not_found(mut self) -> Self {
        self.tolerate_not_found = true;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn module(&self) -> &ModuleName {
        &self.module
    }

    pub fn tolerates_not_found(&self) -> bool {
        self.tolerate_not_found
    }

    pub fn has_skip_predicate(&self) -> bool {
        self.skip.is_some()
    }

    /// Evaluate the skip predicate against `answers`.
    pub fn should_skip(&self, answers: &Answers) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(answers))
    }

    pub(crate) fn run(self, ctx: &mut TaskContext<'_>) -> Result<(), StackError> {
        (self.action)(ctx)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("module", &self.module)
            .field("title", &self.title)
            .field("conditional", &self.skip.is_some())
            .field("tolerate_not_found", &self.tolerate_not_found)
            .finish()
    }
}

/// Everything a task action may touch.
///
/// Actions read any namespace through [`TaskContext::answers`] but can only
/// obtain a mutable handle to the namespace of the module that owns the task.
pub struct TaskContext<'a> {
    answers: &'a mut Answers,
    owner: &'a ModuleName,
    stacks: &'a dyn StackClient,
    cancel: &'a CancelToken,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        answers: &'a mut Answers,
        owner: &'a ModuleName,
        stacks: &'a dyn StackClient,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            answers,
            owner,
            stacks,
            cancel,
        }
    }

    pub fn answers(&self) -> &Answers {
        &*self.answers
    }

    /// The owning module's namespace, for writing outputs
    pub fn own(&mut self) -> &mut Namespace {
        self.answers.namespace_mut(self.owner)
    }

    pub fn module(&self) -> &ModuleName {
        self.owner
    }

    pub fn stacks(&self) -> &'a dyn StackClient {
        self.stacks
    }

    pub fn cancel(&self) -> &'a CancelToken {
        self.cancel
    }
}
