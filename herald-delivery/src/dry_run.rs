//! Channel that only logs what it would do.

use crate::{AttachTechnique, ConversationState, DeliveryChannel, DeliveryRequest};
use async_trait::async_trait;
use herald_core::{Attachment, DeliveryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

/// Accepts every message without sending anything.
///
/// Useful for rehearsing a campaign: pacing, checkpoints and progress all
/// behave as in a real run.
#[derive(Debug, Default)]
pub struct DryRunChannel {
    delivered: AtomicUsize,
}

impl DryRunChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeliveryChannel for DryRunChannel {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn fast_path_ready(&self) -> bool {
        true
    }

    async fn attempt_deliver(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        info!(
            identifier = %request.identifier,
            chars = request.message.chars().count(),
            attachment = ?request.attachment.as_ref().map(|a| a.name.as_str()),
            "Dry run delivery"
        );
        Ok(())
    }

    async fn probe_validity(
        &self,
        _identifier: &str,
        _timeout: Duration,
    ) -> Result<bool, DeliveryError> {
        Ok(false)
    }

    async fn probe_sent(&self, _timeout: Duration) -> Result<bool, DeliveryError> {
        Ok(true)
    }

    async fn open_conversation(&self, _identifier: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn conversation_state(&self, _identifier: &str) -> ConversationState {
        ConversationState::Ready
    }

    async fn attach(
        &self,
        _attachment: &Attachment,
        _technique: AttachTechnique,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn fill_message(&self, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn click_send(&self) -> Result<(), DeliveryError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn emulate_send(&self) -> Result<(), DeliveryError> {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn send_keep_alive(&self, text: &str) -> Result<(), DeliveryError> {
        info!(text = text, "Dry run keep-alive");
        Ok(())
    }
}
