//! Stuck-campaign watchdog.
//!
//! A campaign that sits at "all but one processed" while running, with no
//! pacing wait pending, for longer than the grace period is completed by
//! force: the missing contact is recorded as succeeded and the record is
//! flagged `forced_completion`.
//!
//! An attempt in flight is never cut short while it is within
//! [`EngineConfig::attempt_budget`](herald_core::EngineConfig::attempt_budget);
//! the grace period only starts counting once the attempt has outlived it.

use crate::engine::EngineInner;
use crate::reconciler;
use herald_core::{Campaign, CampaignStatus, ContactOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Reason recorded for the contact completed by force.
pub const FORCED_COMPLETION: &str = "forced completion";

pub(crate) fn spawn(inner: &Arc<EngineInner>, generation: u64) {
    tokio::spawn(run(Arc::clone(inner), generation));
}

async fn run(inner: Arc<EngineInner>, generation: u64) {
    let mut stuck_since: Option<Instant> = None;

    loop {
        tokio::time::sleep(inner.config.watchdog_interval).await;

        let mut state = inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        let attempt_started = state.attempt_started;
        let Some(campaign) = state.campaign.as_mut() else {
            return;
        };
        if campaign.status.is_terminal() {
            return;
        }

        let budget = inner.config.attempt_budget();
        if !looks_stuck(campaign, attempt_started, budget) {
            stuck_since = None;
            continue;
        }
        let since = *stuck_since.get_or_insert_with(Instant::now);
        if since.elapsed() < inner.config.stuck_grace {
            continue;
        }

        force_complete(&inner, campaign).await;
        state.loop_active = false;
        state.attempt_started = None;
        return;
    }
}

/// Whether the campaign is parked on its last contact. An attempt started
/// less than `budget` ago is still running inside its own bounded waits.
fn looks_stuck(campaign: &Campaign, attempt_started: Option<Instant>, budget: Duration) -> bool {
    let on_last_contact = campaign.status == CampaignStatus::Running
        && campaign.resume_at.is_none()
        && campaign.total() > 0
        && campaign.processed() + 1 == campaign.total();
    if !on_last_contact {
        return false;
    }
    match attempt_started {
        Some(started) => started.elapsed() >= budget,
        None => true,
    }
}

async fn force_complete(inner: &EngineInner, campaign: &mut Campaign) {
    let missing = (0..campaign.total())
        .map(|position| campaign.key_at(position))
        .find(|key| !campaign.ledger.is_attempted(key));

    if let Some(key) = &missing {
        campaign.record_outcome(
            key,
            ContactOutcome::Succeeded,
            Some(FORCED_COMPLETION.to_string()),
        );
    }
    campaign.forced_completion = true;
    warn!(
        campaign_id = %campaign.campaign_id,
        identifier = missing.as_deref().unwrap_or("-"),
        "Campaign stuck on its last contact; completing by force"
    );
    reconciler::complete(inner, campaign).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{CampaignRequest, Contact};

    fn campaign() -> Campaign {
        let contacts = vec![Contact::new("15550000001"), Contact::new("15550000002")];
        Campaign::prepare(CampaignRequest::new(contacts, "hi")).unwrap()
    }

    const BUDGET: Duration = Duration::from_secs(60);

    #[test]
    fn test_stuck_only_on_last_contact_while_running() {
        let mut record = campaign();
        assert!(!looks_stuck(&record, None, BUDGET));

        record.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        assert!(looks_stuck(&record, None, BUDGET));

        record.status = CampaignStatus::Paused;
        assert!(!looks_stuck(&record, None, BUDGET));

        record.status = CampaignStatus::Running;
        record.resume_at = Some(chrono::Utc::now());
        assert!(!looks_stuck(&record, None, BUDGET));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_within_budget_is_not_stuck() {
        let mut record = campaign();
        record.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        let started = Instant::now();

        tokio::time::advance(BUDGET - Duration::from_secs(1)).await;
        assert!(!looks_stuck(&record, Some(started), BUDGET));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(looks_stuck(&record, Some(started), BUDGET));
    }
}
