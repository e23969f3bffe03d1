//! Strategy chain runner.

use crate::strategies::{
    AttemptContext, DeliveryStrategy, FastPathStrategy, ManualEmulationStrategy,
    NavigationStrategy, StrategyOutcome,
};
use crate::{DeliveryRequest, ProbeVerdict};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final classification of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryVerdict {
    Delivered,
    Failed,
    /// The campaign was aborted mid-attempt. The caller discards the attempt.
    Aborted,
}

/// Result of running the chain for one contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub verdict: DeliveryVerdict,
    /// Strategy that produced the verdict
    pub strategy: Option<&'static str>,
    pub reason: Option<String>,
    /// The sent indicator was observed
    pub confirmed: bool,
    /// The attachment was dropped and only text went out
    pub degraded: bool,
}

impl DeliveryReport {
    pub fn delivered(strategy: &'static str, confirmed: bool, degraded: bool) -> Self {
        Self {
            verdict: DeliveryVerdict::Delivered,
            strategy: Some(strategy),
            reason: degraded.then(|| "attachment dropped".to_string()),
            confirmed,
            degraded,
        }
    }

    pub fn failed(strategy: Option<&'static str>, reason: impl Into<String>) -> Self {
        Self {
            verdict: DeliveryVerdict::Failed,
            strategy,
            reason: Some(reason.into()),
            confirmed: false,
            degraded: false,
        }
    }

    pub fn aborted() -> Self {
        Self {
            verdict: DeliveryVerdict::Aborted,
            strategy: None,
            reason: Some("aborted".to_string()),
            confirmed: false,
            degraded: false,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.verdict == DeliveryVerdict::Delivered
    }

    pub fn is_aborted(&self) -> bool {
        self.verdict == DeliveryVerdict::Aborted
    }
}

/// Ordered list of strategies tried for every contact.
///
/// Strategies keep per-campaign memory (the fast path remembers when it is
/// unavailable), so build one chain per campaign.
pub struct StrategyChain {
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// Fast path, then navigation, then manual emulation.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(FastPathStrategy::new()),
            Box::new(NavigationStrategy::new()),
            Box::new(ManualEmulationStrategy::new()),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Attempt one delivery.
    ///
    /// A send is only reported as delivered after the post-send window passed
    /// without the invalid indicator appearing.
    pub async fn deliver(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
    ) -> DeliveryReport {
        let mut previous: Option<StrategyOutcome> = None;

        for strategy in &self.strategies {
            if ctx.control.is_terminated() {
                return DeliveryReport::aborted();
            }
            if !strategy.applies(previous.as_ref()) {
                continue;
            }

            let outcome = strategy.attempt(ctx, request, previous.as_ref()).await;
            debug!(
                identifier = %request.identifier,
                strategy = strategy.name(),
                outcome = ?outcome,
                "Strategy finished"
            );

            match outcome {
                StrategyOutcome::Delivered {
                    confirmed,
                    degraded,
                } => {
                    return self
                        .check_after_send(ctx, request, strategy.name(), confirmed, degraded)
                        .await;
                }
                StrategyOutcome::Rejected { reason } | StrategyOutcome::Abandoned { reason } => {
                    warn!(
                        identifier = %request.identifier,
                        strategy = strategy.name(),
                        reason = %reason,
                        "Delivery failed"
                    );
                    return DeliveryReport::failed(Some(strategy.name()), reason);
                }
                StrategyOutcome::Aborted => return DeliveryReport::aborted(),
                other => previous = Some(other),
            }
        }

        let reason = previous
            .as_ref()
            .and_then(|o| o.reason())
            .unwrap_or("no strategy could deliver")
            .to_string();
        warn!(identifier = %request.identifier, reason = %reason, "All strategies exhausted");
        DeliveryReport::failed(None, reason)
    }

    async fn check_after_send(
        &self,
        ctx: &mut AttemptContext,
        request: &DeliveryRequest,
        strategy: &'static str,
        confirmed: bool,
        degraded: bool,
    ) -> DeliveryReport {
        let probe = ctx.probe();
        let window = ctx.config.post_send_window;
        let channel = Arc::clone(&ctx.channel);
        match probe
            .check(channel.as_ref(), &request.identifier, window, &mut ctx.control)
            .await
        {
            ProbeVerdict::Valid => {
                info!(
                    identifier = %request.identifier,
                    strategy = strategy,
                    confirmed = confirmed,
                    degraded = degraded,
                    "Delivered"
                );
                DeliveryReport::delivered(strategy, confirmed, degraded)
            }
            ProbeVerdict::Invalid => {
                warn!(
                    identifier = %request.identifier,
                    strategy = strategy,
                    "Recipient flagged invalid after send"
                );
                DeliveryReport::failed(Some(strategy), "recipient flagged invalid after send")
            }
            ProbeVerdict::Aborted => DeliveryReport::aborted(),
        }
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for StrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyChain")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
