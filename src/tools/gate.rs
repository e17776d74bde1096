//! Approval gate between the task-writing tool and the session
//!
//! The task writer blocks on the gate whenever the agent proposes a plan or
//! finishes a task. The session side decides, either immediately in
//! auto-approve mode or once the user answers.

use async_trait::async_trait;

use crate::types::{Plan, RequestId};

/// Outcome of a plan or task approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed
    Approved {
        /// Optional note from the user
        comment: Option<String>,
    },
    /// Stop and revise
    Rejected {
        /// Optional note from the user
        comment: Option<String>,
    },
}

impl Decision {
    /// Whether the decision lets the agent continue
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Note attached by the user
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::Approved { comment } | Self::Rejected { comment } => comment.as_deref(),
        }
    }
}

/// Outcome of a connector specification request
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorDecision {
    /// The user supplied a specification
    Provided(serde_json::Value),
    /// The user declined, optionally saying why
    Skipped(Option<String>),
}

/// Session side of plan and task approvals
#[async_trait]
pub trait SessionGate: Send + Sync {
    /// The agent wrote a new plan; resolves once it is approved or rejected
    async fn plan_ready(&self, plan: Plan) -> Decision;

    /// The agent finished the current task; resolves once it is reviewed
    async fn task_ready(&self) -> Decision;

    /// The agent moved on to the next task
    fn task_started(&self);

    /// The agent needs a connector specification
    async fn connector_spec(&self, request_id: RequestId) -> ConnectorDecision;
}

/// Gate approving everything without involving a session
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveGate;

#[async_trait]
impl SessionGate for AutoApproveGate {
    async fn plan_ready(&self, _plan: Plan) -> Decision {
        Decision::Approved { comment: None }
    }

    async fn task_ready(&self) -> Decision {
        Decision::Approved { comment: None }
    }

    fn task_started(&self) {}

    async fn connector_spec(&self, _request_id: RequestId) -> ConnectorDecision {
        ConnectorDecision::Skipped(Some("No connector specification available".to_string()))
    }
}
