//! Review staging area
//!
//! A finished generation leaves its scratch workspace behind for the user to
//! accept or decline. [`ReviewStaging`] holds at most one such
//! [`PendingReview`]; a newer record displaces the older one and tears its
//! scratch workspace down.
//!
//! Records expire a fixed time after creation. Expiry is checked lazily on
//! every [`ReviewStaging::get`] and also by one background sweep task that
//! sleeps until the current record's deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::types::{ExecutionContext, MessageId, ProjectSource};
use crate::workspace::ScratchWorkspaces;

// ============================================================================
// PENDING REVIEW
// ============================================================================

/// Finished generation waiting for accept or decline
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReview {
    /// Scratch workspace holding the generated changes
    pub scratch_path: PathBuf,
    /// Scratch-relative paths the generation touched
    pub modified_files: Vec<String>,
    /// Real project the changes belong to
    pub execution: ExecutionContext,
    /// Projects materialised in the scratch workspace
    pub projects: Vec<ProjectSource>,
    /// Whether the scratch workspace is removed once the review ends
    pub should_cleanup: bool,
    /// Monotonic creation time
    pub created_at: Instant,
    /// Transcript message the generation answered
    pub message_id: MessageId,
}

impl PendingReview {
    /// Age of the record
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the record's age exceeds `ttl`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }
}

// ============================================================================
// STAGING AREA
// ============================================================================

/// Single-slot, expiring holder of the pending review
///
/// Must be created inside a Tokio runtime: construction spawns the sweep
/// task, and dropping the staging area aborts it.
pub struct ReviewStaging {
    slot: Arc<Mutex<Option<PendingReview>>>,
    workspaces: ScratchWorkspaces,
    ttl: Duration,
    deadline: watch::Sender<Option<Instant>>,
    sweep_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ReviewStaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewStaging")
            .field("pending", &self.slot.lock().as_ref().map(|r| r.message_id.clone()))
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ReviewStaging {
    /// Create an empty staging area and start its sweep task
    #[must_use]
    pub fn new(workspaces: ScratchWorkspaces, ttl: Duration) -> Self {
        let slot: Arc<Mutex<Option<PendingReview>>> = Arc::new(Mutex::new(None));
        let (deadline, rx) = watch::channel(None);

        let sweep_handle = tokio::spawn(sweep(
            Arc::clone(&slot),
            workspaces.clone(),
            ttl,
            rx,
        ));

        Self {
            slot,
            workspaces,
            ttl,
            deadline,
            sweep_handle: Some(sweep_handle),
        }
    }

    /// Time-to-live of a record
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a record, displacing any existing one
    ///
    /// The displaced record's scratch workspace is torn down unless it is the
    /// same directory as the new one.
    pub async fn set(&self, review: PendingReview) {
        let scratch_path = review.scratch_path.clone();
        let message_id = review.message_id.clone();
        // First timer tick at which the age exceeds the ttl
        let deadline = review.created_at + self.ttl + Duration::from_millis(1);

        let previous = self.slot.lock().replace(review);
        self.deadline.send_replace(Some(deadline));
        log::debug!("[Review] Pending review stored for message {}", message_id);

        if let Some(previous) = previous {
            log::warn!(
                "[Review] Overwrote pending review for message {} with message {}",
                previous.message_id,
                message_id
            );
            if previous.should_cleanup && previous.scratch_path != scratch_path {
                self.workspaces.teardown(&previous.scratch_path).await;
            }
        }
    }

    /// Current record, unless it has expired
    ///
    /// An expired record is dropped and its scratch workspace torn down on a
    /// background task.
    #[must_use]
    pub fn get(&self) -> Option<PendingReview> {
        let mut slot = self.slot.lock();
        let Some(review) = slot.as_ref() else {
            log::debug!("[Review] No pending review");
            return None;
        };
        if !review.is_expired(self.ttl) {
            return Some(review.clone());
        }

        let expired = slot.take();
        drop(slot);
        self.deadline.send_replace(None);
        if let Some(expired) = expired {
            log::warn!(
                "[Review] Pending review for message {} expired after {:.1} minutes",
                expired.message_id,
                expired.age().as_secs_f64() / 60.0
            );
            if expired.should_cleanup {
                self.workspaces.teardown_detached(expired.scratch_path);
            }
        }
        None
    }

    /// Drop the record without touching its scratch workspace
    pub fn clear(&self) {
        if let Some(review) = self.slot.lock().take() {
            log::debug!("[Review] Cleared pending review for message {}", review.message_id);
        }
        self.deadline.send_replace(None);
    }

    /// Drop the record, tearing its scratch workspace down if requested
    pub async fn on_deactivate(&self) {
        self.deadline.send_replace(None);
        let review = self.slot.lock().take();
        if let Some(review) = review {
            log::info!(
                "[Review] Deactivating with pending review for message {}",
                review.message_id
            );
            if review.should_cleanup {
                self.workspaces.teardown(&review.scratch_path).await;
            }
        }
    }
}

impl Drop for ReviewStaging {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep_handle.take() {
            handle.abort();
        }
    }
}

async fn sweep(
    slot: Arc<Mutex<Option<PendingReview>>>,
    workspaces: ScratchWorkspaces,
    ttl: Duration,
    mut deadline: watch::Receiver<Option<Instant>>,
) {
    loop {
        let next = *deadline.borrow_and_update();
        if let Some(at) = next {
            tokio::select! {
                () = tokio::time::sleep_until(at) => {}
                changed = deadline.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }

            let expired = {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|review| review.is_expired(ttl)) {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(review) = expired {
                log::warn!(
                    "[Review] Auto-cleaning expired review for message {}",
                    review.message_id
                );
                if review.should_cleanup {
                    workspaces.teardown(&review.scratch_path).await;
                }
            }
        }

        if deadline.changed().await.is_err() {
            return;
        }
    }
}
