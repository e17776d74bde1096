//! Accept and decline of the pending review

use crate::error::Result;
use crate::machine::ChatEvent;
use crate::review::PendingReview;
use crate::workspace::integrate;

use super::session_manager::SessionManager;

/// Integrate the pending review into the real project, then release it
pub(super) async fn accept(session: &SessionManager) -> Result<bool> {
    let inner = session.inner();
    let Some(review) = inner.review.get() else {
        log::warn!("[Review] Accept requested but no review is pending");
        return Ok(false);
    };

    let result = if review.modified_files.is_empty() {
        Ok(0)
    } else {
        integrate(&review.scratch_path, &review.modified_files, &review.execution).await
    };
    match &result {
        Ok(applied) => log::info!("[Review] Accepted {} file change(s)", applied),
        Err(e) => log::error!("[Review] Failed to integrate accepted changes: {}", e),
    }

    release(session, &review).await;
    result.map(|_| true)
}

/// Release the pending review without integrating it
pub(super) async fn decline(session: &SessionManager) -> bool {
    let Some(review) = session.inner().review.get() else {
        log::warn!("[Review] Decline requested but no review is pending");
        return false;
    };
    log::info!(
        "[Review] Declined {} file change(s)",
        review.modified_files.len()
    );
    release(session, &review).await;
    true
}

async fn release(session: &SessionManager, review: &PendingReview) {
    let inner = session.inner();
    if let Err(e) = inner
        .language_server
        .did_close(&review.scratch_path, &review.projects)
        .await
    {
        log::warn!("[Review] Language server close failed: {}", e);
    }

    tokio::time::sleep(inner.options.settle_delay).await;

    if review.should_cleanup {
        inner.workspaces.teardown(&review.scratch_path).await;
    }
    inner.review.clear();
    session.send(ChatEvent::HideReviewActions).await;
}
