//! Fast path: the application's privileged integration point.

use super::{AttemptContext, DeliveryStrategy, StrategyOutcome};
use crate::{DeliveryRequest, ProbeVerdict};
use async_trait::async_trait;
use herald_core::DeliveryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Delivers through [`DeliveryChannel::attempt_deliver`](crate::DeliveryChannel::attempt_deliver).
///
/// Readiness is awaited for at most `fast_path_ready_timeout`. Once it has
/// timed out the strategy stays disabled for the rest of the campaign.
/// The recipient is watched for the invalid indicator before anything is
/// handed to the channel, as on the navigation path.
#[derive(Debug, Default)]
pub struct FastPathStrategy {
    disabled: AtomicBool,
}

impl FastPathStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    async fn await_ready(&self, ctx: &mut AttemptContext) -> Option<bool> {
        let deadline = Instant::now() + ctx.config.fast_path_ready_timeout;
        loop {
            let ready = tokio::time::timeout(
                ctx.config.channel_call_timeout,
                ctx.channel.fast_path_ready(),
            )
            .await
            .unwrap_or(false);
            if ready {
                return Some(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Some(false);
            }
            let slice = ctx.config.poll_interval.min(deadline - now);
            let poll = ctx.config.poll_interval;
            if !ctx.control.sleep_unless_terminated(slice, poll).await {
                return None;
            }
        }
    }
}

#[async_trait]
impl DeliveryStrategy for FastPathStrategy {
    fn name(&self) -> &'static str {
        "fast_path"
    }

    async fn attempt(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
        _previous: Option<&StrategyOutcome>,
    ) -> StrategyOutcome {
        if self.is_disabled() {
            return StrategyOutcome::NotApplicable {
                reason: "fast path unavailable".to_string(),
            };
        }

        match self.await_ready(ctx).await {
            None => return StrategyOutcome::Aborted,
            Some(false) => {
                self.disabled.store(true, Ordering::Relaxed);
                info!(
                    timeout_ms = ctx.config.fast_path_ready_timeout.as_millis() as u64,
                    "Fast path not ready, disabled for this campaign"
                );
                return StrategyOutcome::NotApplicable {
                    reason: "fast path not ready".to_string(),
                };
            }
            Some(true) => {}
        }

        let probe = ctx.probe();
        let window = ctx.config.validity_timeout;
        let channel = Arc::clone(&ctx.channel);
        match probe
            .check(channel.as_ref(), &request.identifier, window, &mut ctx.control)
            .await
        {
            ProbeVerdict::Valid => {}
            ProbeVerdict::Invalid => {
                return StrategyOutcome::Rejected {
                    reason: "recipient flagged invalid".to_string(),
                }
            }
            ProbeVerdict::Aborted => return StrategyOutcome::Aborted,
        }

        match ctx
            .call("attempt_deliver", channel.attempt_deliver(request))
            .await
        {
            Ok(()) => StrategyOutcome::Delivered {
                confirmed: true,
                degraded: false,
            },
            Err(DeliveryError::Rejected { reason }) => StrategyOutcome::Rejected { reason },
            Err(e) => {
                debug!(identifier = %request.identifier, error = %e, "Fast path attempt failed");
                StrategyOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
