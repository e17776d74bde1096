//! Plan and task types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a single task: pending → in progress → review → completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Pending,
    /// Currently being executed
    InProgress,
    /// Done by the agent, waiting for the user
    Review,
    /// Accepted
    Completed,
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task description as written by the agent
    pub description: String,
    /// Current status
    pub status: TaskStatus,
}

impl Task {
    /// New pending task
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TaskStatus::Pending,
        }
    }
}

/// Ordered list of tasks proposed for a multi-step generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id
    pub id: String,
    /// Ordered tasks
    pub tasks: Vec<Task>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create a plan from a list of tasks
    #[must_use]
    pub fn new(tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tasks,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any task is still `Pending`
    ///
    /// Tasks in progress or awaiting review do not count.
    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        self.tasks
            .iter()
            .any(|task| task.status == TaskStatus::Pending)
    }

    /// Set the status of the task at `index`, ignoring out-of-range indices
    pub fn set_status(&mut self, index: usize, status: TaskStatus) {
        if let Some(task) = self.tasks.get_mut(index) {
            task.status = status;
            self.updated_at = Utc::now();
        }
    }

    /// Index of the last task, clamping `index` into range
    #[must_use]
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.tasks.len().saturating_sub(1))
    }

    /// Mark every `Review` task at or before `last_index` as `Completed`
    pub fn complete_reviewed_through(&mut self, last_index: usize) {
        for task in self.tasks.iter_mut().take(last_index.saturating_add(1)) {
            if task.status == TaskStatus::Review {
                task.status = TaskStatus::Completed;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// How plan and task approvals are obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// The user approves each plan and task
    #[default]
    Manual,
    /// Approvals are granted immediately
    Auto,
}

impl ApprovalMode {
    /// Telemetry label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}
