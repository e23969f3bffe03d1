//! Navigation path: drive the application's UI like a user would.

use super::{settle_send, AttemptContext, DeliveryStrategy, StrategyOutcome};
use crate::{AttachTechnique, ConversationState, DeliveryRequest, ProbeVerdict};
use async_trait::async_trait;
use herald_core::{Attachment, AttachmentFallback, DeliveryError};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Opens the conversation, waits for it, attaches, fills and sends.
///
/// When a required UI element is missing the whole sequence is retried up to
/// `navigation_retries` times.
#[derive(Debug, Default)]
pub struct NavigationStrategy;

/// A required element was not on screen.
struct ElementMissing(String);

impl NavigationStrategy {
    pub fn new() -> Self {
        Self
    }

    async fn try_once(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
    ) -> Result<StrategyOutcome, ElementMissing> {
        let channel = Arc::clone(&ctx.channel);
        let identifier = request.identifier.as_str();

        match ctx
            .call("open_conversation", channel.open_conversation(identifier))
            .await
        {
            Ok(()) => {}
            Err(DeliveryError::ElementNotFound { element }) => return Err(ElementMissing(element)),
            Err(e) => {
                return Ok(StrategyOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }

        match self.wait_for_conversation(ctx, identifier).await {
            Some(ConversationState::Ready) => {}
            Some(ConversationState::Invalid) => {
                return Ok(StrategyOutcome::Rejected {
                    reason: "recipient flagged invalid".to_string(),
                })
            }
            Some(ConversationState::Loading) => {
                return Ok(StrategyOutcome::Failed {
                    reason: DeliveryError::Timeout {
                        operation: "conversation load".to_string(),
                        timeout_ms: ctx.config.conversation_timeout.as_millis() as u64,
                    }
                    .to_string(),
                })
            }
            None => return Ok(StrategyOutcome::Aborted),
        }

        let poll = ctx.config.poll_interval;
        if !ctx
            .control
            .sleep_unless_terminated(ctx.config.settle_delay, poll)
            .await
        {
            return Ok(StrategyOutcome::Aborted);
        }

        let probe = ctx.probe();
        let window = ctx.config.validity_timeout;
        match probe
            .check(channel.as_ref(), identifier, window, &mut ctx.control)
            .await
        {
            ProbeVerdict::Valid => {}
            ProbeVerdict::Invalid => {
                return Ok(StrategyOutcome::Rejected {
                    reason: "recipient flagged invalid".to_string(),
                })
            }
            ProbeVerdict::Aborted => return Ok(StrategyOutcome::Aborted),
        }

        let mut degraded = false;
        if let Some(attachment) = &request.attachment {
            if let Err(reason) = self.attach(ctx, attachment).await {
                match ctx.config.attachment_fallback {
                    AttachmentFallback::FailClosed => {
                        return Ok(StrategyOutcome::Abandoned { reason });
                    }
                    AttachmentFallback::TextOnly => {
                        warn!(
                            identifier = identifier,
                            attachment = %attachment.name,
                            "Attachment dropped, sending text only"
                        );
                        degraded = true;
                    }
                }
            }
        }

        if degraded && request.message.trim().is_empty() {
            return Ok(StrategyOutcome::Abandoned {
                reason: "attachment dropped and message is empty".to_string(),
            });
        }

        if !request.message.is_empty() {
            match ctx
                .call("fill_message", channel.fill_message(&request.message))
                .await
            {
                Ok(()) => {}
                Err(DeliveryError::ElementNotFound { element }) => {
                    return Err(ElementMissing(element))
                }
                Err(e) => {
                    return Ok(StrategyOutcome::Failed {
                        reason: e.to_string(),
                    })
                }
            }
        }

        match ctx.call("click_send", channel.click_send()).await {
            Ok(()) => {}
            Err(DeliveryError::SendControlsMissing) => {
                return Ok(StrategyOutcome::SendControlsMissing { degraded })
            }
            Err(e) => {
                return Ok(StrategyOutcome::Failed {
                    reason: e.to_string(),
                })
            }
        }

        let with_attachment = request.attachment.is_some() && !degraded;
        Ok(settle_send(ctx, with_attachment, degraded).await)
    }

    /// Poll until the conversation is ready or flagged invalid.
    ///
    /// Returns the last state seen (`Loading` on timeout), or `None` when the
    /// campaign was aborted.
    async fn wait_for_conversation(
        &self,
        ctx: &mut AttemptContext,
        identifier: &str,
    ) -> Option<ConversationState> {
        let deadline = Instant::now() + ctx.config.conversation_timeout;
        let poll = ctx.config.poll_interval;
        loop {
            let state = tokio::time::timeout(
                ctx.config.channel_call_timeout,
                ctx.channel.conversation_state(identifier),
            )
            .await
            .unwrap_or(ConversationState::Loading);
            if state != ConversationState::Loading {
                return Some(state);
            }
            let now = Instant::now();
            if now >= deadline {
                return Some(ConversationState::Loading);
            }
            if !ctx
                .control
                .sleep_unless_terminated(poll.min(deadline - now), poll)
                .await
            {
                return None;
            }
        }
    }

    /// Try every injection technique in order.
    async fn attach(&self, ctx: &AttemptContext, attachment: &Attachment) -> Result<(), String> {
        let mut last_error = String::from("no technique available");
        for technique in AttachTechnique::ALL {
            match ctx
                .call("attach", ctx.channel.attach(attachment, technique))
                .await
            {
                Ok(()) => {
                    debug!(technique = %technique, attachment = %attachment.name, "Attached");
                    return Ok(());
                }
                Err(e) => {
                    debug!(technique = %technique, error = %e, "Attach technique failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(format!("attachment could not be attached: {}", last_error))
    }
}

#[async_trait]
impl DeliveryStrategy for NavigationStrategy {
    fn name(&self) -> &'static str {
        "navigation"
    }

    async fn attempt(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
        _previous: Option<&StrategyOutcome>,
    ) -> StrategyOutcome {
        let attempts = ctx.config.navigation_retries + 1;
        let mut missing = String::new();
        for attempt in 1..=attempts {
            if ctx.control.is_terminated() {
                return StrategyOutcome::Aborted;
            }
            match self.try_once(ctx, request).await {
                Ok(outcome) => return outcome,
                Err(ElementMissing(element)) => {
                    debug!(
                        identifier = %request.identifier,
                        element = %element,
                        attempt = attempt,
                        "UI element missing"
                    );
                    missing = element;
                }
            }
        }
        StrategyOutcome::Failed {
            reason: DeliveryError::ElementNotFound { element: missing }.to_string(),
        }
    }
}
