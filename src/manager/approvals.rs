//! Plan, task and connector decisions parked by the tools
//!
//! In auto-approve mode the gate answers immediately. Otherwise it parks a
//! oneshot sender that the session manager resolves when the user answers.
//! A parked decision whose sender is dropped resolves as rejected or skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::dispatch::SessionBridge;
use crate::machine::ChatEvent;
use crate::tools::{ConnectorDecision, Decision, SessionGate};
use crate::types::{ApprovalMode, Plan, RequestId};

use super::session_manager::SessionLink;

/// Decisions waiting for the user
#[derive(Debug, Default)]
pub(super) struct PendingDecisions {
    plan: Mutex<Option<oneshot::Sender<Decision>>>,
    task: Mutex<Option<oneshot::Sender<Decision>>>,
    connectors: Mutex<HashMap<RequestId, oneshot::Sender<ConnectorDecision>>>,
}

impl PendingDecisions {
    fn park_plan(&self) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        if self.plan.lock().replace(tx).is_some() {
            log::warn!("[Approval] Replacing an unanswered plan approval");
        }
        rx
    }

    fn park_task(&self) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        if self.task.lock().replace(tx).is_some() {
            log::warn!("[Approval] Replacing an unanswered task review");
        }
        rx
    }

    fn park_connector(&self, request_id: RequestId) -> oneshot::Receiver<ConnectorDecision> {
        let (tx, rx) = oneshot::channel();
        self.connectors.lock().insert(request_id, tx);
        rx
    }

    /// Answer the parked plan approval; false if none was waiting
    pub(super) fn resolve_plan(&self, decision: Decision) -> bool {
        self.plan
            .lock()
            .take()
            .is_some_and(|tx| tx.send(decision).is_ok())
    }

    /// Answer the parked task review; false if none was waiting
    pub(super) fn resolve_task(&self, decision: Decision) -> bool {
        self.task
            .lock()
            .take()
            .is_some_and(|tx| tx.send(decision).is_ok())
    }

    /// Whether a connector request is waiting under `request_id`
    pub(super) fn has_connector(&self, request_id: &RequestId) -> bool {
        self.connectors.lock().contains_key(request_id)
    }

    /// Answer a parked connector request; false if none was waiting
    pub(super) fn resolve_connector(&self, request_id: &RequestId, decision: ConnectorDecision) -> bool {
        self.connectors
            .lock()
            .remove(request_id)
            .is_some_and(|tx| tx.send(decision).is_ok())
    }

    /// Drop every parked decision
    pub(super) fn cancel_all(&self) {
        let mut dropped = self.connectors.lock().drain().count();
        if self.plan.lock().take().is_some() {
            dropped += 1;
        }
        if self.task.lock().take().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            log::debug!("[Approval] Cancelled {} pending decision(s)", dropped);
        }
    }
}

/// Gate handed to the tools of one generation
pub(super) struct GateHandle {
    link: SessionLink,
    decisions: Arc<PendingDecisions>,
}

impl GateHandle {
    pub(super) const fn new(link: SessionLink, decisions: Arc<PendingDecisions>) -> Self {
        Self { link, decisions }
    }

    fn auto_approve(&self) -> bool {
        self.link.view().approval_mode == ApprovalMode::Auto
    }
}

#[async_trait]
impl SessionGate for GateHandle {
    async fn plan_ready(&self, plan: Plan) -> Decision {
        if self.auto_approve() {
            self.link.post(ChatEvent::PlanGenerated { plan });
            self.link.post(ChatEvent::ApprovePlan { comment: None });
            return Decision::Approved { comment: None };
        }

        let rx = self.decisions.park_plan();
        self.link.post(ChatEvent::PlanGenerated { plan });
        rx.await.unwrap_or_else(|_| Decision::Rejected {
            comment: Some("Plan approval was cancelled".to_string()),
        })
    }

    async fn task_ready(&self) -> Decision {
        if self.auto_approve() {
            self.link.post(ChatEvent::TaskCompleted);
            self.link.post(ChatEvent::ApproveTask {
                last_approved_task_index: None,
            });
            return Decision::Approved { comment: None };
        }

        let rx = self.decisions.park_task();
        self.link.post(ChatEvent::TaskCompleted);
        rx.await.unwrap_or_else(|_| Decision::Rejected {
            comment: Some("Task review was cancelled".to_string()),
        })
    }

    fn task_started(&self) {
        self.link.post(ChatEvent::StartTaskExecution);
    }

    async fn connector_spec(&self, request_id: RequestId) -> ConnectorDecision {
        let rx = self.decisions.park_connector(request_id.clone());
        self.link.post(ChatEvent::ConnectorGenerationRequested {
            request_id,
            from_state: None,
        });
        rx.await.unwrap_or_else(|_| {
            ConnectorDecision::Skipped(Some("Connector request was cancelled".to_string()))
        })
    }
}
