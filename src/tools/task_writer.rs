//! `task_write` tool
//!
//! The agent keeps its plan in a task list and rewrites the whole list on
//! every call. Each write is classified against the previous one:
//!
//! - a different list of descriptions is a new plan and waits for plan
//!   approval;
//! - a task newly marked completed waits for task review;
//! - anything else is progress. After a rejected task, the first write that
//!   marks a task in progress restarts execution.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::types::{Plan, Task, TaskStatus};

use super::{Decision, SessionGate, TASK_WRITE_TOOL, ToolDefinition};

/// Input of the `task_write` tool
#[derive(Debug, Clone, Deserialize)]
pub struct TaskWriteInput {
    /// Full task list
    pub tasks: Vec<Task>,
}

/// Output of the `task_write` tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWriteOutput {
    /// Whether the write was accepted
    pub success: bool,
    /// Instructions for the model
    pub message: String,
    /// Task list as recorded
    pub tasks: Vec<Task>,
}

/// How one write relates to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskWrite {
    /// A new list of tasks
    NewPlan,
    /// The task at this index was just completed
    TaskCompleted(usize),
    /// Status changes only
    Progress,
}

#[derive(Debug, Default)]
struct Tracker {
    tasks: Vec<Task>,
    awaiting_restart: bool,
}

impl Tracker {
    fn classify(&self, tasks: &[Task]) -> TaskWrite {
        let same_plan = self.tasks.len() == tasks.len()
            && self
                .tasks
                .iter()
                .zip(tasks)
                .all(|(old, new)| old.description == new.description);
        if !same_plan {
            return TaskWrite::NewPlan;
        }
        self.tasks
            .iter()
            .zip(tasks)
            .position(|(old, new)| {
                old.status != TaskStatus::Completed && new.status == TaskStatus::Completed
            })
            .map_or(TaskWrite::Progress, TaskWrite::TaskCompleted)
    }
}

/// Classify a write against the previously recorded list
#[must_use]
pub fn classify(previous: &[Task], next: &[Task]) -> TaskWrite {
    Tracker {
        tasks: previous.to_vec(),
        awaiting_restart: false,
    }
    .classify(next)
}

/// Build the `task_write` tool for one generation
pub fn task_write_tool(gate: Arc<dyn SessionGate>, cancel: CancellationToken) -> ToolDefinition {
    let tracker = Arc::new(Mutex::new(Tracker::default()));

    ToolDefinition::typed(
        TASK_WRITE_TOOL,
        "Record the full task list. Write a new list to propose a plan, then mark tasks \
         in_progress and completed as you work through them. Completing a task waits for review.",
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": { "type": "string" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "review", "completed"]
                            }
                        },
                        "required": ["description", "status"]
                    }
                }
            },
            "required": ["tasks"]
        }),
        move |input: TaskWriteInput| {
            let tracker = Arc::clone(&tracker);
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            async move {
                if input.tasks.is_empty() {
                    return Err(AgentError::tool(TASK_WRITE_TOOL, "Task list must not be empty"));
                }
                let tasks = input.tasks;
                let (kind, restart) = {
                    let mut tracker = tracker.lock();
                    let kind = tracker.classify(&tasks);
                    let restart = kind == TaskWrite::Progress
                        && tracker.awaiting_restart
                        && tasks.iter().any(|t| t.status == TaskStatus::InProgress);
                    if restart {
                        tracker.awaiting_restart = false;
                    }
                    tracker.tasks.clone_from(&tasks);
                    (kind, restart)
                };

                let message = match kind {
                    TaskWrite::NewPlan => {
                        log::debug!("[Tools] New plan with {} task(s)", tasks.len());
                        let decision =
                            decide(&cancel, gate.plan_ready(Plan::new(tasks.clone()))).await;
                        if decision.is_approved() {
                            gate.task_started();
                            with_comment(
                                "Plan approved. Start with the first task and mark it in_progress.",
                                decision.comment(),
                            )
                        } else {
                            *tracker.lock() = Tracker::default();
                            with_comment(
                                "Plan rejected. Revise the plan and write a new task list.",
                                decision.comment(),
                            )
                        }
                    }
                    TaskWrite::TaskCompleted(index) => {
                        log::debug!("[Tools] Task {} completed, waiting for review", index);
                        let decision = decide(&cancel, gate.task_ready()).await;
                        if decision.is_approved() {
                            let more = tasks.iter().any(|t| t.status != TaskStatus::Completed);
                            if more {
                                gate.task_started();
                                with_comment(
                                    "Task approved. Continue with the next task.",
                                    decision.comment(),
                                )
                            } else {
                                with_comment("Task approved. All tasks are completed.", decision.comment())
                            }
                        } else {
                            tracker.lock().awaiting_restart = true;
                            with_comment(
                                "Task rejected. Mark it in_progress again and address the feedback.",
                                decision.comment(),
                            )
                        }
                    }
                    TaskWrite::Progress => {
                        if restart {
                            gate.task_started();
                        }
                        "Task list updated.".to_string()
                    }
                };

                Ok(TaskWriteOutput {
                    success: true,
                    message,
                    tasks,
                })
            }
        },
    )
}

async fn decide<F>(cancel: &CancellationToken, decision: F) -> Decision
where
    F: std::future::Future<Output = Decision>,
{
    tokio::select! {
        decision = decision => decision,
        () = cancel.cancelled() => Decision::Rejected {
            comment: Some("Generation cancelled".to_string()),
        },
    }
}

fn with_comment(message: &str, comment: Option<&str>) -> String {
    match comment {
        Some(comment) if !comment.is_empty() => format!("{message} User comment: {comment}"),
        _ => message.to_string(),
    }
}
