//! The dispatch loop.
//!
//! One loop task per campaign generation. Each turn takes the state lock,
//! decides the next step, releases the lock and only then waits or talks to
//! the channel, so control calls are never blocked behind a delivery.

use crate::engine::{EngineInner, EngineState};
use crate::entitlement::{recheck, Recheck, DEFAULT_ACCOUNT};
use crate::reconciler;
use chrono::Utc;
use futures_util::FutureExt;
use herald_core::{
    render_message, Campaign, CampaignStatus, ContactOutcome, HeraldResult, ProgressEvent,
    ProgressKind, WaitKind, SKIP_INVALID_IDENTIFIER,
};
use herald_delivery::strategies::bounded;
use herald_delivery::{AttemptContext, DeliveryRequest, StrategyChain};
use herald_pacing::{BatchPlanner, SafetyPing};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Spawn the loop for the current generation.
pub(crate) fn spawn(inner: &Arc<EngineInner>, state: &mut EngineState) {
    state.loop_active = true;
    let handle = tokio::spawn(run(Arc::clone(inner), state.generation));
    state.dispatch = Some(handle);
}

/// Loop entry point. Errors and panics end the campaign as failed.
async fn run(inner: Arc<EngineInner>, generation: u64) {
    let outcome = AssertUnwindSafe(dispatch_loop(&inner, generation))
        .catch_unwind()
        .await;

    let reason = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(panic) => format!("dispatch loop panicked: {}", panic_message(panic.as_ref())),
    };

    let mut state = inner.state.lock().await;
    if state.generation != generation {
        return;
    }
    state.loop_active = false;
    state.attempt_started = None;
    if let Some(campaign) = state.campaign.as_mut() {
        if !campaign.status.is_terminal() {
            reconciler::fail(&inner, campaign, reason).await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// STEPS
// ============================================================================

/// What the loop does next, decided under the lock.
enum Step {
    Exit,
    Wait { deadline: Instant },
    Recheck { account: String },
    Dispatch(Prepared),
}

struct Prepared {
    index: usize,
    key: String,
    request: DeliveryRequest,
    chain: Arc<StrategyChain>,
}

async fn dispatch_loop(inner: &Arc<EngineInner>, generation: u64) -> HeraldResult<()> {
    let mut control = inner.signal.handle();
    let mut last_entitlement_check = Instant::now();

    loop {
        let step = {
            let mut state = inner.state.lock().await;
            if state.generation != generation {
                return Ok(());
            }
            let recheck_due = last_entitlement_check.elapsed() >= inner.config.entitlement_recheck;
            next_step(inner, &mut state, recheck_due).await
        };

        match step {
            Step::Exit => return Ok(()),
            Step::Wait { deadline } => {
                let outcome = control
                    .wait_until(deadline, inner.config.poll_interval)
                    .await;
                if outcome.is_elapsed() {
                    finish_wait(inner, generation).await;
                }
            }
            Step::Recheck { account } => {
                last_entitlement_check = Instant::now();
                handle_recheck(inner, generation, &account).await;
            }
            Step::Dispatch(prepared) => {
                let mut ctx = AttemptContext::new(
                    Arc::clone(&inner.channel),
                    Arc::clone(&inner.config),
                    control.clone(),
                );
                let report = prepared.chain.deliver(&mut ctx, &prepared.request).await;

                let ping_due = {
                    let mut state = inner.state.lock().await;
                    if state.generation != generation {
                        return Ok(());
                    }
                    record_attempt(inner, &mut state, &prepared, report).await
                };
                if ping_due {
                    send_safety_ping(inner, generation).await;
                }
            }
        }
    }
}

/// Decide the next step. Skips are applied here without leaving the lock.
async fn next_step(inner: &EngineInner, state: &mut EngineState, recheck_due: bool) -> Step {
    let chain = Arc::clone(&state.chain);
    let Some(campaign) = state.campaign.as_mut() else {
        state.loop_active = false;
        return Step::Exit;
    };
    if !campaign.status.is_active() {
        state.loop_active = false;
        return Step::Exit;
    }

    if let Some(resume_at) = campaign.resume_at {
        if campaign.wait_kind == Some(WaitKind::Batch)
            && campaign.status != CampaignStatus::BatchWaiting
        {
            inner.set_status(campaign, CampaignStatus::BatchWaiting);
        }
        let remaining = (resume_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        return Step::Wait {
            deadline: Instant::now() + remaining,
        };
    }

    skip_handled(inner, campaign);

    if campaign.current_index >= campaign.total() {
        reconciler::complete(inner, campaign).await;
        state.loop_active = false;
        return Step::Exit;
    }

    if recheck_due {
        let account = campaign
            .account_id
            .clone()
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
        return Step::Recheck { account };
    }

    let index = campaign.current_index;
    let key = campaign.key_at(index);
    let contact = &campaign.contacts[index];
    let message = render_message(&campaign.message_template, contact);
    let request = DeliveryRequest::new(key.clone(), message)
        .with_attachment(campaign.attachment.clone());

    inner.emit(ProgressEvent::from_campaign(ProgressKind::Sending, campaign).with_identifier(&key));
    debug!(campaign_id = %campaign.campaign_id, index, identifier = %key, "Dispatching");

    state.attempt_started = Some(Instant::now());
    Step::Dispatch(Prepared {
        index,
        key,
        request,
        chain,
    })
}

/// Move `current_index` past contacts that already have an outcome or can
/// never be dispatched.
fn skip_handled(inner: &EngineInner, campaign: &mut Campaign) {
    while campaign.current_index < campaign.total() {
        let index = campaign.current_index;
        let key = campaign.key_at(index);
        if campaign.ledger.is_attempted(&key) {
            campaign.current_index += 1;
            continue;
        }
        if campaign.contacts[index].eligible().is_none() {
            campaign.record_outcome(
                &key,
                ContactOutcome::Skipped,
                Some(SKIP_INVALID_IDENTIFIER.to_string()),
            );
            inner.emit(
                ProgressEvent::from_campaign(ProgressKind::Skipped, campaign)
                    .with_identifier(&key)
                    .with_reason(SKIP_INVALID_IDENTIFIER),
            );
            campaign.current_index += 1;
            continue;
        }
        break;
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Record the outcome of one attempt and schedule what follows it.
///
/// Returns `true` when a safety ping is due.
async fn record_attempt(
    inner: &EngineInner,
    state: &mut EngineState,
    prepared: &Prepared,
    report: herald_delivery::DeliveryReport,
) -> bool {
    state.attempt_started = None;
    let EngineState {
        campaign, pacing, ..
    } = state;
    let Some(campaign) = campaign.as_mut() else {
        return false;
    };

    if campaign.status.is_terminal() || report.is_aborted() {
        debug!(
            campaign_id = %campaign.campaign_id,
            identifier = %prepared.key,
            "Attempt discarded"
        );
        return false;
    }

    let (outcome, kind) = if report.is_delivered() {
        (ContactOutcome::Succeeded, ProgressKind::Delivered)
    } else {
        (ContactOutcome::Failed, ProgressKind::Failed)
    };
    campaign.record_outcome(&prepared.key, outcome, report.reason.clone());
    campaign.current_index = prepared.index + 1;

    let mut event = ProgressEvent::from_campaign(kind, campaign).with_identifier(&prepared.key);
    if let Some(reason) = &report.reason {
        event = event.with_reason(reason);
    }
    inner.emit(event);
    info!(
        campaign_id = %campaign.campaign_id,
        identifier = %prepared.key,
        outcome = %outcome,
        strategy = report.strategy.unwrap_or("none"),
        confirmed = report.confirmed,
        degraded = report.degraded,
        "Contact processed"
    );

    let remaining = campaign.outstanding() > 0;
    let ping_due =
        SafetyPing::new(pacing, inner.config.safety_ping_every).on_dispatched(campaign);

    if let Some(wait) = BatchPlanner::new(pacing).on_dispatched(campaign, remaining) {
        let until = Utc::now() + to_chrono(wait.duration);
        campaign.resume_at = Some(until);
        campaign.wait_kind = Some(WaitKind::Batch);
        if campaign.status == CampaignStatus::Running {
            inner.set_status(campaign, CampaignStatus::BatchWaiting);
        }
        inner.emit(
            ProgressEvent::from_campaign(ProgressKind::BatchWaiting, campaign)
                .with_wait_until(until)
                .with_batch(wait.batch_number),
        );
        info!(
            campaign_id = %campaign.campaign_id,
            batch = wait.batch_number,
            wait_secs = wait.duration.as_secs(),
            "Batch finished; waiting"
        );
    } else if remaining {
        let delay = pacing.message_delay(&campaign.pacing, campaign.attachment.as_ref());
        if !delay.is_zero() {
            let until = Utc::now() + to_chrono(delay);
            campaign.resume_at = Some(until);
            campaign.wait_kind = Some(WaitKind::Message);
            inner.emit(
                ProgressEvent::from_campaign(ProgressKind::Waiting, campaign)
                    .with_wait_until(until),
            );
        }
    }

    reconciler::persist(inner, campaign).await;
    ping_due
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// A pacing wait ran its course.
async fn finish_wait(inner: &EngineInner, generation: u64) {
    let mut state = inner.state.lock().await;
    if state.generation != generation {
        return;
    }
    let EngineState {
        campaign, pacing, ..
    } = &mut *state;
    let Some(campaign) = campaign.as_mut() else {
        return;
    };
    if !campaign.status.is_active() {
        return;
    }

    let kind = campaign.wait_kind;
    campaign.clear_wait();
    if kind == Some(WaitKind::Batch) {
        BatchPlanner::new(pacing).start_next(campaign);
        if campaign.status == CampaignStatus::BatchWaiting {
            inner.set_status(campaign, CampaignStatus::Running);
        }
        debug!(
            campaign_id = %campaign.campaign_id,
            batch = campaign.batch.batch_number,
            "Next batch started"
        );
    }
    reconciler::persist(inner, campaign).await;
}

async fn handle_recheck(inner: &EngineInner, generation: u64, account: &str) {
    match recheck(inner.gate.as_ref(), account).await {
        Recheck::Entitled => {}
        Recheck::Unknown(reason) => {
            warn!(account, reason = %reason, "Entitlement check unavailable; continuing");
        }
        Recheck::Revoked => {
            let mut state = inner.state.lock().await;
            if state.generation != generation {
                return;
            }
            let Some(campaign) = state.campaign.as_mut() else {
                return;
            };
            if !campaign.status.is_active() {
                return;
            }
            let reason = format!("entitlement revoked for account {}", account);
            inner.set_status(campaign, CampaignStatus::Paused);
            campaign.last_error = Some(reason.clone());
            reconciler::persist(inner, campaign).await;
            inner.emit(
                ProgressEvent::from_campaign(ProgressKind::Paused, campaign).with_reason(&reason),
            );
            warn!(campaign_id = %campaign.campaign_id, account, "Entitlement revoked; campaign paused");
        }
    }
}

/// Send the keep-alive message. Failures are logged only.
async fn send_safety_ping(inner: &EngineInner, generation: u64) {
    let text = inner.config.keep_alive_text.clone();
    let limit = inner.config.channel_call_timeout;
    if let Err(e) = bounded(limit, "send_keep_alive", inner.channel.send_keep_alive(&text)).await {
        warn!(error = %e, "Safety ping failed");
        return;
    }

    let state = inner.state.lock().await;
    if state.generation != generation {
        return;
    }
    if let Some(campaign) = state.campaign.as_ref() {
        inner.emit(ProgressEvent::from_campaign(ProgressKind::SafetyPing, campaign));
        debug!(campaign_id = %campaign.campaign_id, "Safety ping sent");
    }
}
