//! Manual-emulation fallback.

use super::{settle_send, AttemptContext, DeliveryStrategy, StrategyOutcome};
use crate::DeliveryRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Sends through emulated low-level input.
///
/// Only runs right after the navigation path prepared the conversation but
/// could not find the send control.
#[derive(Debug, Default)]
pub struct ManualEmulationStrategy;

impl ManualEmulationStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeliveryStrategy for ManualEmulationStrategy {
    fn name(&self) -> &'static str {
        "manual_emulation"
    }

    fn applies(&self, previous: Option<&StrategyOutcome>) -> bool {
        matches!(previous, Some(StrategyOutcome::SendControlsMissing { .. }))
    }

    async fn attempt(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
        previous: Option<&StrategyOutcome>,
    ) -> StrategyOutcome {
        let degraded = matches!(
            previous,
            Some(StrategyOutcome::SendControlsMissing { degraded: true })
        );
        let channel = Arc::clone(&ctx.channel);
        match ctx.call("emulate_send", channel.emulate_send()).await {
            Ok(()) => {
                let with_attachment = request.attachment.is_some() && !degraded;
                settle_send(ctx, with_attachment, degraded).await
            }
            Err(e) => StrategyOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}
