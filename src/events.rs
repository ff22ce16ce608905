//! Task lifecycle events.
//!
//! The executor reports every task transition to an [`EventSink`]. The
//! binary logs them through [`TracingSink`] and echoes progress to the
//! terminal with [`ConsoleSink`]; tests collect them with [`RecordingSink`].

use std::cell::RefCell;
use std::fmt;

use crate::module::ModuleName;

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEventKind {
    /// The action is about to run
    Started,
    /// The skip predicate held; the action never ran
    Skipped,
    Succeeded,
    /// The action failed; the rest of the plan is abandoned
    Failed(String),
    /// The run was cancelled while the action ran
    Cancelled,
    /// A delete found its target already gone and counted that as success
    NotFoundTolerated,
}

impl fmt::Display for TaskEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Skipped => f.write_str("skipped"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(cause) => write!(f, "failed: {}", cause),
            Self::Cancelled => f.write_str("cancelled"),
            Self::NotFoundTolerated => f.write_str("already removed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub module: ModuleName,
    pub title: String,
    pub kind: TaskEventKind,
}

impl TaskEvent {
    pub fn new(module: &ModuleName, title: &str, kind: TaskEventKind) -> Self {
        Self {
            module: module.clone(),
            title: title.to_string(),
            kind,
        }
    }
}

/// Receiver of task events.
pub trait EventSink {
    fn emit(&self, event: &TaskEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TaskEvent) {
        let module = event.module.as_str();
        let task = event.title.as_str();
        match &event.kind {
            TaskEventKind::Started => tracing::info!(module, task, "task started"),
            TaskEventKind::Skipped => tracing::info!(module, task, "task skipped"),
            TaskEventKind::Succeeded => tracing::debug!(module, task, "task succeeded"),
            TaskEventKind::Failed(cause) => {
                tracing::error!(module, task, cause = cause.as_str(), "task failed")
            }
            TaskEventKind::Cancelled => tracing::warn!(module, task, "task cancelled"),
            TaskEventKind::NotFoundTolerated => {
                tracing::warn!(module, task, "target already removed, continuing")
            }
        }
    }
}

/// Prints one progress line per finished task to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: &TaskEvent) {
        let marker = match event.kind {
            TaskEventKind::Started => return,
            TaskEventKind::Succeeded => "✓",
            TaskEventKind::Skipped => "-",
            TaskEventKind::NotFoundTolerated => "~",
            TaskEventKind::Failed(_) => "✗",
            TaskEventKind::Cancelled => "⊘",
        };
        println!("{} [{}] {}", marker, event.module, event.title);
    }
}

/// Sends every event to each inner sink in turn.
pub struct FanOut<'a>(pub Vec<&'a dyn EventSink>);

impl EventSink for FanOut<'_> {
    fn emit(&self, event: &TaskEvent) {
        for sink in &self.0 {
            sink.emit(event);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<TaskEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.borrow().clone()
    }

    /// Titles of tasks that ended with `kind`, in order
    pub fn titles(&self, kind: &TaskEventKind) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| &e.kind == kind)
            .map(|e| e.title.clone())
            .collect()
    }

    /// Modules in the order their first event arrived
    pub fn modules(&self) -> Vec<ModuleName> {
        let mut seen: Vec<ModuleName> = Vec::new();
        for event in self.events.borrow().iter() {
            if !seen.contains(&event.module) {
                seen.push(event.module.clone());
            }
        }
        seen
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &TaskEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
