//! Persistence and terminal bookkeeping.
//!
//! Every write to the checkpoint store goes through here. Store failures are
//! logged and never stop a campaign.

use crate::engine::EngineInner;
use herald_core::{Campaign, CampaignStatus, LastResults, ProgressEvent, ProgressKind};
use tracing::{error, info, warn};

/// Snapshot the live record.
pub(crate) async fn persist(inner: &EngineInner, campaign: &Campaign) {
    if let Err(e) = inner.store.save(campaign).await {
        warn!(
            campaign_id = %campaign.campaign_id,
            error = %e,
            "Checkpoint write failed; campaign continues"
        );
    }
}

/// Close out a campaign whose contacts all have an outcome (or are forced to).
///
/// Contacts that somehow have no outcome are recorded as failed so the three
/// outcome lists always partition the contact list.
pub(crate) async fn complete(inner: &EngineInner, campaign: &mut Campaign) {
    let filled = campaign.settle_outstanding();
    if filled > 0 {
        warn!(
            campaign_id = %campaign.campaign_id,
            filled,
            "Contacts without outcome recorded as failed"
        );
    }
    campaign.clear_wait();
    campaign.current_index = campaign.total();
    inner.set_status(campaign, CampaignStatus::Completed);
    archive(inner, campaign).await;

    inner.emit(ProgressEvent::from_campaign(ProgressKind::Completed, campaign));
    info!(
        campaign_id = %campaign.campaign_id,
        sent = campaign.sent_count,
        failed = campaign.failed_count,
        forced = campaign.forced_completion,
        "Campaign completed"
    );
}

/// Abort a non-terminal campaign. Outcomes already recorded are kept;
/// contacts never reached get none.
pub(crate) async fn abort(inner: &EngineInner, campaign: &mut Campaign) {
    campaign.clear_wait();
    inner.set_status(campaign, CampaignStatus::Aborted);
    archive(inner, campaign).await;

    inner.emit(ProgressEvent::from_campaign(ProgressKind::Aborted, campaign));
    info!(
        campaign_id = %campaign.campaign_id,
        index = campaign.current_index,
        sent = campaign.sent_count,
        failed = campaign.failed_count,
        "Campaign aborted"
    );
}

/// Mark the campaign failed after an unrecoverable loop fault.
///
/// The checkpoint is kept so the record can be inspected.
pub(crate) async fn fail(inner: &EngineInner, campaign: &mut Campaign, reason: String) {
    inner.set_status(campaign, CampaignStatus::Failed);
    campaign.last_error = Some(reason.clone());
    persist(inner, campaign).await;

    inner.emit(
        ProgressEvent::from_campaign(ProgressKind::CampaignFailed, campaign).with_reason(&reason),
    );
    error!(
        campaign_id = %campaign.campaign_id,
        index = campaign.current_index,
        reason = %reason,
        "Campaign failed"
    );
}

/// Store the final results and drop the live checkpoint.
async fn archive(inner: &EngineInner, campaign: &Campaign) {
    let results = LastResults::from_campaign(campaign);
    if let Err(e) = inner.store.save_last_results(&results).await {
        warn!(campaign_id = %campaign.campaign_id, error = %e, "Failed to archive results");
    }
    if let Err(e) = inner.store.clear(&campaign.campaign_id).await {
        warn!(campaign_id = %campaign.campaign_id, error = %e, "Failed to clear checkpoint");
    }
}
