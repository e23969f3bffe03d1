//! Core entity structures

use crate::{
    eligible_identifier, ledger_key, normalize_identifier, AttachmentKind, BatchStatus,
    CampaignId, CampaignStatus, ContactOutcome, DedupLedger, HeraldResult, PacingConfig,
    ProgressKind, Timestamp, ValidationError, WaitKind,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Reason recorded for contacts whose identifier cannot be dispatched.
pub const SKIP_INVALID_IDENTIFIER: &str = "invalid identifier";

/// Reason recorded for contacts that never reported an outcome.
pub const OUTCOME_UNKNOWN: &str = "outcome unknown";

// ============================================================================
// CONTACTS AND PAYLOAD
// ============================================================================

/// One message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Raw identifier as imported, punctuation included
    pub identifier: String,
    /// Template fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Contact {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Field value, matched case-insensitively.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Digits of the raw identifier.
    pub fn normalized(&self) -> String {
        normalize_identifier(&self.identifier)
    }

    /// Normalized identifier, if long enough to dispatch.
    pub fn eligible(&self) -> Option<String> {
        eligible_identifier(&self.identifier)
    }
}

/// Reference to a file sent alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Where the channel can fetch the payload from
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_mime(&self.mime_type)
    }
}

// ============================================================================
// BATCH AND PING BOOKKEEPING
// ============================================================================

/// One planned batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlanEntry {
    pub batch_number: u32,
    pub size: u32,
    pub wait_minutes: u32,
    pub status: BatchStatus,
}

/// Position within the running batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCursor {
    /// 1-based number of the running batch, 0 before the first
    pub batch_number: u32,
    pub sent_in_batch: u32,
    pub batch_size: u32,
}

/// Messages dispatched since the last safety ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingCursor {
    pub since_ping: u32,
    /// 0 until the first threshold is drawn
    pub next_ping_after: u32,
}

// ============================================================================
// CAMPAIGN
// ============================================================================

/// Input for starting a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRequest {
    /// Generated when absent
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    /// Account checked against the entitlement gate
    #[serde(default)]
    pub account_id: Option<String>,
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub message_template: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub pacing: PacingConfig,
}

impl CampaignRequest {
    pub fn new(contacts: Vec<Contact>, message_template: impl Into<String>) -> Self {
        Self {
            campaign_id: None,
            account_id: None,
            contacts,
            message_template: message_template.into(),
            attachment: None,
            pacing: PacingConfig::default(),
        }
    }

    pub fn with_id(mut self, campaign_id: impl Into<CampaignId>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn validate(&self) -> HeraldResult<()> {
        if self.contacts.is_empty() {
            return Err(ValidationError::EmptyContactList.into());
        }
        if self.message_template.trim().is_empty() && self.attachment.is_none() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "message_template".to_string(),
            }
            .into());
        }
        if let Some(id) = &self.campaign_id {
            if id.as_str().trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "campaign_id".to_string(),
                    reason: "campaign id must not be blank".to_string(),
                }
                .into());
            }
        }
        self.pacing.validate()
    }
}

/// The unit of work: one bulk-send job over an ordered contact list.
///
/// This is also the checkpoint. Everything needed to resume after a restart,
/// pending waits included, lives in this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub campaign_id: CampaignId,
    #[serde(default)]
    pub account_id: Option<String>,
    pub contacts: Vec<Contact>,
    pub message_template: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub pacing: PacingConfig,

    pub current_index: usize,
    pub status: CampaignStatus,
    /// Successful deliveries
    pub sent_count: usize,
    /// Failed and skipped contacts
    pub failed_count: usize,
    pub ledger: DedupLedger,

    #[serde(default)]
    pub batch_plan: Vec<BatchPlanEntry>,
    #[serde(default)]
    pub batch: BatchCursor,
    #[serde(default)]
    pub ping: PingCursor,

    /// Absolute end of a pending pacing wait
    #[serde(default)]
    pub resume_at: Option<Timestamp>,
    #[serde(default)]
    pub wait_kind: Option<WaitKind>,

    pub start_time: Timestamp,
    pub last_update_time: Timestamp,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Set when completion was forced by the stuck-campaign watchdog
    #[serde(default)]
    pub forced_completion: bool,
}

impl Campaign {
    /// Build a running campaign from a validated request.
    ///
    /// Contacts are de-duplicated by normalized identifier (first occurrence
    /// wins) and contacts that can never be dispatched are recorded as skipped
    /// up front.
    pub fn prepare(request: CampaignRequest) -> HeraldResult<Self> {
        request.validate()?;

        let mut seen = HashSet::new();
        let contacts: Vec<Contact> = request
            .contacts
            .into_iter()
            .filter(|contact| {
                let digits = contact.normalized();
                digits.is_empty() || seen.insert(digits)
            })
            .collect();

        let now = Utc::now();
        let mut campaign = Self {
            campaign_id: request.campaign_id.unwrap_or_else(CampaignId::generate),
            account_id: request.account_id,
            contacts,
            message_template: request.message_template,
            attachment: request.attachment,
            pacing: request.pacing,
            current_index: 0,
            status: CampaignStatus::Running,
            sent_count: 0,
            failed_count: 0,
            ledger: DedupLedger::new(),
            batch_plan: Vec::new(),
            batch: BatchCursor::default(),
            ping: PingCursor::default(),
            resume_at: None,
            wait_kind: None,
            start_time: now,
            last_update_time: now,
            last_error: None,
            forced_completion: false,
        };

        for position in 0..campaign.contacts.len() {
            if campaign.contacts[position].eligible().is_none() {
                let key = campaign.key_at(position);
                campaign.record_outcome(
                    &key,
                    ContactOutcome::Skipped,
                    Some(SKIP_INVALID_IDENTIFIER.to_string()),
                );
            }
        }

        Ok(campaign)
    }

    pub fn total(&self) -> usize {
        self.contacts.len()
    }

    /// Contacts with a counted outcome.
    pub fn processed(&self) -> usize {
        self.sent_count + self.failed_count
    }

    /// Contacts still without an outcome. Ineligible contacts are recorded
    /// as skipped when the campaign is prepared, so these all await an
    /// attempt.
    pub fn outstanding(&self) -> usize {
        self.total().saturating_sub(self.ledger.len())
    }

    /// Ledger key of the contact at `position`.
    pub fn key_at(&self, position: usize) -> String {
        self.contacts
            .get(position)
            .map(|contact| ledger_key(&contact.identifier, position))
            .unwrap_or_else(|| format!("#{}", position))
    }

    /// Record an outcome and bump the counters.
    ///
    /// Returns `false` when the identifier already had an outcome, in which
    /// case nothing changes.
    pub fn record_outcome(
        &mut self,
        identifier: &str,
        outcome: ContactOutcome,
        reason: Option<String>,
    ) -> bool {
        if !self.ledger.record(identifier, outcome, reason) {
            return false;
        }
        match outcome {
            ContactOutcome::Succeeded => self.sent_count += 1,
            ContactOutcome::Failed | ContactOutcome::Skipped => self.failed_count += 1,
        }
        self.touch();
        true
    }

    /// Re-derive the counters from the ledger.
    pub fn sync_counts(&mut self) {
        let counts = self.ledger.counts();
        self.sent_count = counts.succeeded;
        self.failed_count = counts.failed + counts.skipped;
    }

    /// Record every contact without an outcome as failed and re-derive the
    /// counters. Returns how many contacts were filled in.
    pub fn settle_outstanding(&mut self) -> usize {
        let mut filled = 0;
        for position in 0..self.contacts.len() {
            let key = self.key_at(position);
            if self
                .ledger
                .record(&key, ContactOutcome::Failed, Some(OUTCOME_UNKNOWN.to_string()))
            {
                filled += 1;
            }
        }
        self.sync_counts();
        self.touch();
        filled
    }

    /// Status as observers should see it.
    ///
    /// A non-terminal campaign whose counters already cover every contact is
    /// reported as completed.
    pub fn effective_status(&self) -> CampaignStatus {
        if !self.status.is_terminal() && self.total() > 0 && self.processed() >= self.total() {
            CampaignStatus::Completed
        } else {
            self.status
        }
    }

    pub fn clear_wait(&mut self) {
        self.resume_at = None;
        self.wait_kind = None;
    }

    pub fn touch(&mut self) {
        self.last_update_time = Utc::now();
    }
}

// ============================================================================
// RESULTS AND PROGRESS
// ============================================================================

/// Archived summary of a finished (completed or aborted) campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastResults {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub total: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub finished_at: Timestamp,
    #[serde(default)]
    pub forced_completion: bool,
}

impl LastResults {
    pub fn from_campaign(campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.campaign_id.clone(),
            status: campaign.status,
            succeeded: campaign.ledger.succeeded(),
            failed: campaign.ledger.failed(),
            skipped: campaign.ledger.skipped(),
            total: campaign.total(),
            sent_count: campaign.sent_count,
            failed_count: campaign.failed_count,
            finished_at: Utc::now(),
            forced_completion: campaign.forced_completion,
        }
    }
}

/// Progress notification emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub campaign_id: CampaignId,
    pub kind: ProgressKind,
    pub index: usize,
    pub total: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub status: CampaignStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_wait_until: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub emitted_at: Timestamp,
}

impl ProgressEvent {
    /// Snapshot the campaign counters into an event of `kind`.
    pub fn from_campaign(kind: ProgressKind, campaign: &Campaign) -> Self {
        Self {
            campaign_id: campaign.campaign_id.clone(),
            kind,
            index: campaign.current_index,
            total: campaign.total(),
            sent_count: campaign.sent_count,
            failed_count: campaign.failed_count,
            status: campaign.effective_status(),
            current_identifier: None,
            next_wait_until: None,
            batch: None,
            reason: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.current_identifier = Some(identifier.into());
        self
    }

    pub fn with_wait_until(mut self, until: Timestamp) -> Self {
        self.next_wait_until = Some(until);
        self
    }

    pub fn with_batch(mut self, batch_number: u32) -> Self {
        self.batch = Some(batch_number);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeraldError;

    fn request(ids: &[&str]) -> CampaignRequest {
        CampaignRequest::new(ids.iter().map(|id| Contact::new(*id)).collect(), "hello")
    }

    #[test]
    fn test_prepare_rejects_empty_contacts() {
        let err = Campaign::prepare(request(&[])).unwrap_err();
        assert!(matches!(
            err,
            HeraldError::Validation(ValidationError::EmptyContactList)
        ));
    }

    #[test]
    fn test_prepare_requires_message_or_attachment() {
        let req = CampaignRequest::new(vec![Contact::new("15550000001")], "  ");
        assert!(Campaign::prepare(req).is_err());

        let req = CampaignRequest::new(vec![Contact::new("15550000001")], "").with_attachment(
            Attachment {
                name: "flyer.png".into(),
                mime_type: "image/png".into(),
                uri: "file:///tmp/flyer.png".into(),
                size_bytes: None,
            },
        );
        assert!(Campaign::prepare(req).is_ok());
    }

    #[test]
    fn test_prepare_dedups_by_normalized_identifier() {
        let campaign = Campaign::prepare(request(&[
            "+1 555 000 0001",
            "15550000002",
            "1-555-000-0001",
        ]))
        .unwrap();
        assert_eq!(campaign.total(), 2);
        assert_eq!(campaign.contacts[0].identifier, "+1 555 000 0001");
    }

    #[test]
    fn test_prepare_pre_skips_invalid_identifiers() {
        let campaign = Campaign::prepare(request(&[
            "15550000001",
            "1234567",
            "n/a",
            "unknown",
        ]))
        .unwrap();

        assert_eq!(campaign.total(), 4);
        assert_eq!(campaign.ledger.skipped(), vec!["1234567", "#2", "#3"]);
        assert_eq!(campaign.failed_count, 3);
        assert_eq!(campaign.sent_count, 0);
        assert_eq!(campaign.status, CampaignStatus::Running);
    }

    #[test]
    fn test_record_outcome_counts_once() {
        let mut campaign = Campaign::prepare(request(&["15550000001", "15550000002"])).unwrap();
        assert!(campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None));
        assert!(!campaign.record_outcome("15550000001", ContactOutcome::Failed, None));
        assert_eq!(campaign.sent_count, 1);
        assert_eq!(campaign.failed_count, 0);
    }

    #[test]
    fn test_outstanding_excludes_recorded_and_skipped() {
        let mut campaign =
            Campaign::prepare(request(&["15550000001", "15550000002", "123"])).unwrap();
        assert_eq!(campaign.outstanding(), 2);

        campaign.record_outcome("15550000002", ContactOutcome::Failed, None);
        assert_eq!(campaign.outstanding(), 1);

        campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        assert_eq!(campaign.outstanding(), 0);
    }

    #[test]
    fn test_effective_status_infers_completion() {
        let mut campaign = Campaign::prepare(request(&["15550000001", "15550000002"])).unwrap();
        campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        assert_eq!(campaign.effective_status(), CampaignStatus::Running);

        campaign.record_outcome("15550000002", ContactOutcome::Failed, None);
        assert_eq!(campaign.effective_status(), CampaignStatus::Completed);

        campaign.status = CampaignStatus::Aborted;
        assert_eq!(campaign.effective_status(), CampaignStatus::Aborted);
    }

    #[test]
    fn test_settle_outstanding_fills_unknown_outcomes() {
        let mut campaign =
            Campaign::prepare(request(&["15550000001", "15550000002", "15550000003"])).unwrap();
        campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None);

        assert_eq!(campaign.settle_outstanding(), 2);
        assert_eq!(campaign.sent_count + campaign.failed_count, 3);
        assert!(campaign.ledger.is_partition_of(3));
        assert_eq!(
            campaign.ledger.entry("15550000003").and_then(|e| e.reason.clone()),
            Some(OUTCOME_UNKNOWN.to_string())
        );
    }

    #[test]
    fn test_campaign_round_trips_through_json() {
        let mut campaign = Campaign::prepare(request(&["15550000001", "123"])).unwrap();
        campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        campaign.resume_at = Some(Utc::now());
        campaign.wait_kind = Some(WaitKind::Batch);

        let json = serde_json::to_vec(&campaign).unwrap();
        let restored: Campaign = serde_json::from_slice(&json).unwrap();
        assert_eq!(restored, campaign);
    }

    #[test]
    fn test_last_results_lists_partition() {
        let mut campaign = Campaign::prepare(request(&["15550000001", "15550000002", "1"])).unwrap();
        campaign.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        campaign.record_outcome("15550000002", ContactOutcome::Failed, Some("invalid".into()));
        campaign.status = CampaignStatus::Completed;

        let results = LastResults::from_campaign(&campaign);
        assert_eq!(results.succeeded, vec!["15550000001"]);
        assert_eq!(results.failed, vec!["15550000002"]);
        assert_eq!(results.skipped, vec!["1"]);
        assert_eq!(results.total, 3);
    }

    #[test]
    fn test_progress_event_builders() {
        let campaign = Campaign::prepare(request(&["15550000001"])).unwrap();
        let event = ProgressEvent::from_campaign(ProgressKind::Sending, &campaign)
            .with_identifier("15550000001")
            .with_batch(1);
        assert_eq!(event.total, 1);
        assert_eq!(event.current_identifier.as_deref(), Some("15550000001"));
        assert_eq!(event.batch, Some(1));
        assert!(event.reason.is_none());
    }
}
