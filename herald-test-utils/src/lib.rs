//! HERALD Test Utilities
//!
//! Centralized test infrastructure for the HERALD workspace:
//! - A scripted delivery channel with per-identifier behaviors
//! - Scripted entitlement gates
//! - Proptest generators for contacts and pacing
//! - Test fixtures for common campaigns
//! - Custom assertions for ledger invariants

// Re-export the in-memory store from its source crate
pub use herald_storage::InMemoryCheckpointStore;

// Re-export core types for convenience
pub use herald_core::{
    Attachment, Campaign, CampaignId, CampaignRequest, CampaignStatus, Contact, ContactOutcome,
    DeliveryError, EngineConfig, EngineError, HeraldError, HeraldResult, LastResults,
    PacingConfig, ProgressEvent, ProgressKind,
};
pub use herald_events::{ControlHandle, ControlSignal};

use async_trait::async_trait;
use herald_delivery::{AttachTechnique, ConversationState, DeliveryChannel, DeliveryRequest};
use herald_engine::EntitlementGate;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// ============================================================================
// SCRIPTED CHANNEL
// ============================================================================

#[derive(Debug, Default)]
struct Script {
    fast_path_ready: bool,
    invalid: HashSet<String>,
    invalid_after_send: HashSet<String>,
    fast_path_errors: HashMap<String, DeliveryError>,
    slow: HashMap<String, Duration>,
    panic_on: HashSet<String>,
    missing_send_controls: bool,
    failing_attach: bool,
    missing_elements: usize,
    unconfirmed_sends: bool,
    keep_alive_fails: bool,

    open: Option<String>,
    sent: Vec<String>,
    calls: Vec<String>,
    keep_alives: Vec<String>,
    attached: Vec<AttachTechnique>,
}

/// Delivery channel whose behavior is scripted per identifier.
///
/// By default the fast path is ready, every recipient is valid and every
/// send is confirmed. Identifiers that actually went out are listed by
/// [`sent`](Self::sent).
#[derive(Debug, Clone)]
pub struct ScriptedChannel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                fast_path_ready: true,
                ..Script::default()
            })),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_fast_path(self, ready: bool) -> Self {
        self.script().fast_path_ready = ready;
        self
    }

    /// The recipient is invalid before anything is sent.
    pub fn invalid_number(self, identifier: &str) -> Self {
        self.script().invalid.insert(identifier.to_string());
        self
    }

    /// The invalid indicator appears only once the message went out.
    pub fn invalid_after_send(self, identifier: &str) -> Self {
        self.script()
            .invalid_after_send
            .insert(identifier.to_string());
        self
    }

    /// The fast path fails for `identifier` with `error`.
    pub fn fail_fast_path(self, identifier: &str, error: DeliveryError) -> Self {
        self.script()
            .fast_path_errors
            .insert(identifier.to_string(), error);
        self
    }

    /// Every call addressed to `identifier` (fast-path delivery and opening
    /// its conversation) takes `delay`.
    pub fn slow_on(self, identifier: &str, delay: Duration) -> Self {
        self.script().slow.insert(identifier.to_string(), delay);
        self
    }

    /// Delivering to `identifier` panics.
    pub fn panic_on(self, identifier: &str) -> Self {
        self.script().panic_on.insert(identifier.to_string());
        self
    }

    pub fn missing_send_controls(self) -> Self {
        self.script().missing_send_controls = true;
        self
    }

    /// Every attach technique fails.
    pub fn failing_attach(self) -> Self {
        self.script().failing_attach = true;
        self
    }

    /// The next `count` navigations fail with a missing element.
    pub fn missing_elements(self, count: usize) -> Self {
        self.script().missing_elements = count;
        self
    }

    /// The sent indicator never shows.
    pub fn unconfirmed_sends(self) -> Self {
        self.script().unconfirmed_sends = true;
        self
    }

    pub fn failing_keep_alive(self) -> Self {
        self.script().keep_alive_fails = true;
        self
    }

    /// Identifiers whose message actually went out, in order.
    pub fn sent(&self) -> Vec<String> {
        self.script().sent.clone()
    }

    /// Every channel call as `method:argument`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        let prefix = format!("{}:", method);
        self.script()
            .calls
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .count()
    }

    pub fn keep_alives(&self) -> Vec<String> {
        self.script().keep_alives.clone()
    }

    pub fn attached(&self) -> Vec<AttachTechnique> {
        self.script().attached.clone()
    }

    fn log(&self, method: &str, argument: &str) {
        self.script().calls.push(format!("{}:{}", method, argument));
    }

    fn mark_sent(&self) -> Result<(), DeliveryError> {
        let mut script = self.script();
        let identifier = script.open.clone().ok_or_else(|| DeliveryError::ElementNotFound {
            element: "conversation".to_string(),
        })?;
        script.sent.push(identifier);
        Ok(())
    }
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fast_path_ready(&self) -> bool {
        self.script().fast_path_ready
    }

    async fn attempt_deliver(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        self.log("attempt_deliver", &request.identifier);
        let (delay, panics) = {
            let script = self.script();
            (
                script.slow.get(&request.identifier).copied(),
                script.panic_on.contains(&request.identifier),
            )
        };
        if panics {
            panic!("scripted panic for {}", request.identifier);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script();
        if let Some(error) = script.fast_path_errors.get(&request.identifier) {
            return Err(error.clone());
        }
        if script.invalid.contains(&request.identifier) {
            return Err(DeliveryError::Rejected {
                reason: "number not on the network".to_string(),
            });
        }
        script.open = Some(request.identifier.clone());
        script.sent.push(request.identifier.clone());
        Ok(())
    }

    async fn probe_validity(
        &self,
        identifier: &str,
        _timeout: Duration,
    ) -> Result<bool, DeliveryError> {
        let script = self.script();
        let already_sent = script.sent.iter().any(|sent| sent == identifier);
        Ok(script.invalid.contains(identifier)
            || (already_sent && script.invalid_after_send.contains(identifier)))
    }

    async fn probe_sent(&self, _timeout: Duration) -> Result<bool, DeliveryError> {
        Ok(!self.script().unconfirmed_sends)
    }

    async fn open_conversation(&self, identifier: &str) -> Result<(), DeliveryError> {
        self.log("open_conversation", identifier);
        let delay = self.script().slow.get(identifier).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.script();
        if script.missing_elements > 0 {
            script.missing_elements -= 1;
            return Err(DeliveryError::ElementNotFound {
                element: "search box".to_string(),
            });
        }
        script.open = Some(identifier.to_string());
        Ok(())
    }

    async fn conversation_state(&self, identifier: &str) -> ConversationState {
        if self.script().open.as_deref() == Some(identifier) {
            ConversationState::Ready
        } else {
            ConversationState::Loading
        }
    }

    async fn attach(
        &self,
        attachment: &Attachment,
        technique: AttachTechnique,
    ) -> Result<(), DeliveryError> {
        self.log("attach", technique.as_str());
        let mut script = self.script();
        if script.failing_attach {
            return Err(DeliveryError::AttachmentFailed {
                technique: technique.to_string(),
                reason: format!("{} rejected", attachment.name),
            });
        }
        script.attached.push(technique);
        Ok(())
    }

    async fn fill_message(&self, text: &str) -> Result<(), DeliveryError> {
        self.log("fill_message", text);
        Ok(())
    }

    async fn click_send(&self) -> Result<(), DeliveryError> {
        self.log("click_send", "");
        if self.script().missing_send_controls {
            return Err(DeliveryError::SendControlsMissing);
        }
        self.mark_sent()
    }

    async fn emulate_send(&self) -> Result<(), DeliveryError> {
        self.log("emulate_send", "");
        self.mark_sent()
    }

    async fn send_keep_alive(&self, text: &str) -> Result<(), DeliveryError> {
        self.log("send_keep_alive", text);
        let mut script = self.script();
        if script.keep_alive_fails {
            return Err(DeliveryError::Unavailable {
                reason: "self chat unavailable".to_string(),
            });
        }
        script.keep_alives.push(text.to_string());
        Ok(())
    }
}

// ============================================================================
// SCRIPTED ENTITLEMENT GATE
// ============================================================================

/// One answer of a [`ScriptedGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAnswer {
    Allow,
    Deny,
    Unreachable,
}

/// Entitlement gate answering from a script. The last answer repeats.
#[derive(Debug, Clone)]
pub struct ScriptedGate {
    answers: Arc<Mutex<VecDeque<GateAnswer>>>,
    last: Arc<Mutex<GateAnswer>>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedGate {
    pub fn new(answers: impl IntoIterator<Item = GateAnswer>) -> Self {
        let answers: VecDeque<GateAnswer> = answers.into_iter().collect();
        let last = answers.back().copied().unwrap_or(GateAnswer::Allow);
        Self {
            answers: Arc::new(Mutex::new(answers)),
            last: Arc::new(Mutex::new(last)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn always(answer: GateAnswer) -> Self {
        Self::new([answer])
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntitlementGate for ScriptedGate {
    async fn is_entitled(&self, account: &str) -> Result<bool, EngineError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        let answer = {
            let mut answers = self.answers.lock().unwrap_or_else(PoisonError::into_inner);
            match answers.pop_front() {
                Some(answer) => {
                    *self.last.lock().unwrap_or_else(PoisonError::into_inner) = answer;
                    answer
                }
                None => *self.last.lock().unwrap_or_else(PoisonError::into_inner),
            }
        };
        match answer {
            GateAnswer::Allow => Ok(true),
            GateAnswer::Deny => Ok(false),
            GateAnswer::Unreachable => Err(EngineError::EntitlementUnavailable {
                reason: format!("entitlement service unreachable for {}", account),
            }),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use herald_core::{BatchPacing, RandomRange};
    use proptest::prelude::*;

    /// A dispatchable identifier in one of several spellings.
    pub fn arb_valid_identifier() -> impl Strategy<Value = String> {
        ("[1-9][0-9]{7,12}", 0usize..3).prop_map(|(digits, style)| match style {
            0 => digits,
            1 => format!("+{}", digits),
            _ => {
                let (head, tail) = digits.split_at(3);
                format!("({}) {}", head, tail)
            }
        })
    }

    /// An identifier with fewer than eight digits.
    pub fn arb_short_identifier() -> impl Strategy<Value = String> {
        "[0-9]{0,7}"
    }

    pub fn arb_contact() -> impl Strategy<Value = Contact> {
        (
            prop_oneof![4 => arb_valid_identifier(), 1 => arb_short_identifier()],
            "[A-Z][a-z]{2,8}",
        )
            .prop_map(|(identifier, name)| Contact::new(identifier).with_field("name", name))
    }

    pub fn arb_contacts(max: usize) -> impl Strategy<Value = Vec<Contact>> {
        prop::collection::vec(arb_contact(), 1..=max)
    }

    pub fn arb_random_range(max: u32) -> impl Strategy<Value = RandomRange> {
        (0..=max, 0..=max).prop_map(|(a, b)| RandomRange::new(a.min(b), a.max(b)))
    }

    pub fn arb_batch_pacing() -> impl Strategy<Value = BatchPacing> {
        ((1u32..=5), (0u32..=3), arb_random_range(10)).prop_map(|(min, span, delay)| {
            BatchPacing {
                size: RandomRange::new(min, min + span),
                delay_minutes: delay,
            }
        })
    }

    /// Pacing with no message delay and optional batching.
    pub fn arb_immediate_pacing() -> impl Strategy<Value = PacingConfig> {
        prop::option::of(arb_batch_pacing()).prop_map(|batch| PacingConfig {
            batch,
            ..PacingConfig::immediate()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use tokio::sync::broadcast;

    /// Identifier of the `n`-th fixture contact.
    pub fn identifier(n: usize) -> String {
        format!("1555000{:04}", n)
    }

    /// `count` distinct valid contacts with a `name` field.
    pub fn contacts(count: usize) -> Vec<Contact> {
        (1..=count)
            .map(|n| Contact::new(identifier(n)).with_field("name", format!("Contact{}", n)))
            .collect()
    }

    /// Immediate-pacing request over `count` fixture contacts.
    pub fn request(count: usize) -> CampaignRequest {
        CampaignRequest::new(contacts(count), "Hello {{name}}").with_pacing(PacingConfig::immediate())
    }

    pub fn pdf_attachment() -> Attachment {
        Attachment {
            name: "brochure.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            uri: "file:///tmp/brochure.pdf".to_string(),
            size_bytes: Some(48_000),
        }
    }

    /// Short timeouts so a campaign runs in milliseconds of (virtual) time.
    pub fn test_config() -> EngineConfig {
        EngineConfig::development()
    }

    /// Everything currently buffered on a progress receiver.
    pub fn drain_events(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return events,
            }
        }
    }

    pub fn count_kind(events: &[ProgressEvent], kind: ProgressKind) -> usize {
        events.iter().filter(|event| event.kind == kind).count()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// The ledger's succeeded, failed and skipped lists partition the
    /// contact list and agree with the counters.
    pub fn assert_partition(campaign: &Campaign) {
        assert!(
            campaign.ledger.is_partition_of(campaign.total()),
            "ledger does not partition {} contacts: {:?}",
            campaign.total(),
            campaign.ledger.counts()
        );
        let counts = campaign.ledger.counts();
        assert_eq!(campaign.sent_count, counts.succeeded);
        assert_eq!(campaign.failed_count, counts.failed + counts.skipped);
    }

    pub fn assert_results_partition(results: &LastResults) {
        assert_eq!(
            results.succeeded.len() + results.failed.len() + results.skipped.len(),
            results.total,
            "results do not cover every contact"
        );
    }

    /// No identifier went out twice.
    pub fn assert_no_duplicates(sent: &[String]) {
        let unique: HashSet<&String> = sent.iter().collect();
        assert_eq!(unique.len(), sent.len(), "duplicate dispatch in {:?}", sent);
    }

    pub fn assert_status(campaign: &Campaign, expected: CampaignStatus) {
        assert_eq!(
            campaign.status, expected,
            "expected {}, campaign is {}",
            expected, campaign.status
        );
    }

    pub fn assert_engine_error<T: std::fmt::Debug>(result: &HeraldResult<T>) {
        assert!(
            matches!(result, Err(HeraldError::Engine(_))),
            "expected engine error, got {:?}",
            result
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
