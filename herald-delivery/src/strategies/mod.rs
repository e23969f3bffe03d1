//! Delivery strategies.
//!
//! Each strategy is one way of getting a message out. The chain tries them in
//! order; a strategy's outcome tells the chain whether to stop or fall through.

pub mod fast_path;
pub mod manual;
pub mod navigation;

pub use fast_path::FastPathStrategy;
pub use manual::ManualEmulationStrategy;
pub use navigation::NavigationStrategy;

use crate::{DeliveryChannel, DeliveryRequest, SentVerdict, ValidityProbe};
use async_trait::async_trait;
use herald_core::{DeliveryError, EngineConfig};
use herald_events::ControlHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What one strategy achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// The message left. `confirmed` when the sent indicator was seen,
    /// `degraded` when the attachment was dropped.
    Delivered { confirmed: bool, degraded: bool },
    /// The recipient is invalid. Final.
    Rejected { reason: String },
    /// Failed in a way no other strategy can fix. Final.
    Abandoned { reason: String },
    /// Failed; the next strategy may try.
    Failed { reason: String },
    /// The strategy did not run.
    NotApplicable { reason: String },
    /// Conversation prepared but the send control could not be found.
    /// `degraded` when the attachment was already dropped.
    SendControlsMissing { degraded: bool },
    /// The campaign was aborted mid-attempt.
    Aborted,
}

impl StrategyOutcome {
    /// Whether the chain must stop after this outcome.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Delivered { .. } | Self::Rejected { .. } | Self::Abandoned { .. } | Self::Aborted
        )
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Rejected { reason }
            | Self::Abandoned { reason }
            | Self::Failed { reason }
            | Self::NotApplicable { reason } => Some(reason),
            Self::SendControlsMissing { .. } => Some("send controls missing"),
            Self::Aborted => Some("aborted"),
            Self::Delivered { .. } => None,
        }
    }
}

/// Everything a strategy needs besides the request.
pub struct AttemptContext {
    pub channel: Arc<dyn DeliveryChannel>,
    pub config: Arc<EngineConfig>,
    pub control: ControlHandle,
}

impl AttemptContext {
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        config: Arc<EngineConfig>,
        control: ControlHandle,
    ) -> Self {
        Self {
            channel,
            config,
            control,
        }
    }

    pub fn probe(&self) -> ValidityProbe {
        ValidityProbe::new(self.config.poll_interval)
            .with_call_timeout(self.config.channel_call_timeout)
    }

    /// Run one channel call under `channel_call_timeout`.
    pub async fn call<T, F>(&self, operation: &str, call: F) -> Result<T, DeliveryError>
    where
        F: Future<Output = Result<T, DeliveryError>>,
    {
        bounded(self.config.channel_call_timeout, operation, call).await
    }
}

/// Await `call` for at most `limit`. An overrun is a [`DeliveryError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, DeliveryError>
where
    F: Future<Output = Result<T, DeliveryError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// One delivery mechanism.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether to run given the outcome of the previous strategy.
    fn applies(&self, _previous: Option<&StrategyOutcome>) -> bool {
        true
    }

    async fn attempt(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
        previous: Option<&StrategyOutcome>,
    ) -> StrategyOutcome;
}

/// Settle the outcome of a send that was just triggered.
///
/// Text-only sends wait (bounded) for the sent indicator; when it never shows
/// and nothing went wrong the send counts as delivered, unconfirmed.
/// Attachment sends do not wait here.
pub(crate) async fn settle_send(
    ctx: &mut AttemptContext,
    with_attachment: bool,
    degraded: bool,
) -> StrategyOutcome {
    if with_attachment {
        return StrategyOutcome::Delivered {
            confirmed: false,
            degraded,
        };
    }
    let probe = ctx.probe();
    let window = ctx.config.sent_confirmation_timeout;
    let channel = Arc::clone(&ctx.channel);
    match probe
        .confirm_sent(channel.as_ref(), window, &mut ctx.control)
        .await
    {
        SentVerdict::Confirmed => StrategyOutcome::Delivered {
            confirmed: true,
            degraded,
        },
        SentVerdict::Unconfirmed => StrategyOutcome::Delivered {
            confirmed: false,
            degraded,
        },
        SentVerdict::Aborted => StrategyOutcome::Aborted,
    }
}
