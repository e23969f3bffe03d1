//! Campaign engine: the control surface of one campaign.

use crate::dispatch;
use crate::entitlement::{check_at_start, AllowAll, EntitlementGate, DEFAULT_ACCOUNT};
use crate::reconciler;
use crate::watchdog;
use herald_core::{
    Campaign, CampaignId, CampaignRequest, CampaignStatus, EngineConfig, EngineError,
    HeraldResult, ProgressEvent, ProgressKind, StorageError,
};
use herald_delivery::{DeliveryChannel, StrategyChain};
use herald_events::{ControlSignal, ProgressHub};
use herald_pacing::PacingController;
use herald_storage::CheckpointStore;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

// ============================================================================
// SHARED STATE
// ============================================================================

/// Mutable engine state. Guarded by one async mutex.
pub(crate) struct EngineState {
    pub campaign: Option<Campaign>,
    /// Bumped on every start; tasks of an older generation exit on sight.
    pub generation: u64,
    /// A dispatch loop of the current generation is running.
    pub loop_active: bool,
    /// When the attempt now in flight was handed to the strategy chain.
    pub attempt_started: Option<Instant>,
    pub chain: Arc<StrategyChain>,
    pub pacing: PacingController,
    pub dispatch: Option<JoinHandle<()>>,
}

/// Everything the dispatch loop, the watchdog and the control surface share.
pub(crate) struct EngineInner {
    pub config: Arc<EngineConfig>,
    pub store: Arc<dyn CheckpointStore>,
    pub channel: Arc<dyn DeliveryChannel>,
    pub gate: Arc<dyn EntitlementGate>,
    pub hub: ProgressHub,
    pub signal: ControlSignal,
    pub seed: Option<u64>,
    pub state: Mutex<EngineState>,
}

impl EngineInner {
    /// Change the campaign status and publish it on the control signal.
    pub fn set_status(&self, campaign: &mut Campaign, status: CampaignStatus) {
        campaign.status = status;
        campaign.touch();
        self.signal.set(status);
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.hub.broadcast(event);
    }

    pub fn new_pacing(&self) -> PacingController {
        match self.seed {
            Some(seed) => PacingController::seeded(seed),
            None => PacingController::new(),
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`CampaignEngine`].
pub struct EngineBuilder {
    channel: Arc<dyn DeliveryChannel>,
    store: Arc<dyn CheckpointStore>,
    gate: Arc<dyn EntitlementGate>,
    config: EngineConfig,
    seed: Option<u64>,
}

impl EngineBuilder {
    pub fn gate(mut self, gate: Arc<dyn EntitlementGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed every random pacing decision.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> HeraldResult<CampaignEngine> {
        self.config.validate()?;
        let inner = EngineInner {
            hub: ProgressHub::new(self.config.progress_capacity),
            config: Arc::new(self.config),
            store: self.store,
            channel: self.channel,
            gate: self.gate,
            signal: ControlSignal::new(CampaignStatus::Idle),
            seed: self.seed,
            state: Mutex::new(EngineState {
                campaign: None,
                generation: 0,
                loop_active: false,
                attempt_started: None,
                chain: Arc::new(StrategyChain::standard()),
                pacing: PacingController::new(),
                dispatch: None,
            }),
        };
        Ok(CampaignEngine {
            inner: Arc::new(inner),
        })
    }
}

// ============================================================================
// CAMPAIGN ENGINE
// ============================================================================

/// Runs one campaign at a time.
///
/// Cloning is cheap; clones control the same campaign.
///
/// ```text
/// idle ──start──▶ running ⇄ paused
///                    │
///                    ▼
///          completed | failed | aborted
/// ```
#[derive(Clone)]
pub struct CampaignEngine {
    inner: Arc<EngineInner>,
}

impl CampaignEngine {
    pub fn builder(
        channel: Arc<dyn DeliveryChannel>,
        store: Arc<dyn CheckpointStore>,
    ) -> EngineBuilder {
        EngineBuilder {
            channel,
            store,
            gate: Arc::new(AllowAll),
            config: EngineConfig::default(),
            seed: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start a campaign.
    ///
    /// # Errors
    ///
    /// - `EngineError::AlreadyActive` while a non-terminal campaign exists
    /// - `ValidationError` for an empty contact list or missing message
    /// - `EngineError::NotEntitled` / `EntitlementUnavailable` when the gate
    ///   does not clearly allow the account
    pub async fn start(&self, request: CampaignRequest) -> HeraldResult<CampaignId> {
        let mut state = self.inner.state.lock().await;
        if let Some(current) = &state.campaign {
            if !current.status.is_terminal() {
                return Err(EngineError::AlreadyActive {
                    campaign_id: current.campaign_id.clone(),
                }
                .into());
            }
        }

        let mut campaign = Campaign::prepare(request)?;
        let account = campaign
            .account_id
            .clone()
            .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
        check_at_start(self.inner.gate.as_ref(), &account).await?;

        self.inner.set_status(&mut campaign, CampaignStatus::Running);
        reconciler::persist(&self.inner, &campaign).await;
        self.inner
            .emit(ProgressEvent::from_campaign(ProgressKind::Started, &campaign));
        info!(
            campaign_id = %campaign.campaign_id,
            total = campaign.total(),
            pre_skipped = campaign.ledger.counts().skipped,
            "Campaign started"
        );

        let campaign_id = campaign.campaign_id.clone();
        state.campaign = Some(campaign);
        state.generation += 1;
        state.attempt_started = None;
        state.chain = Arc::new(StrategyChain::standard());
        state.pacing = self.inner.new_pacing();
        dispatch::spawn(&self.inner, &mut state);
        watchdog::spawn(&self.inner, state.generation);

        Ok(campaign_id)
    }

    /// Pause a running campaign. Pausing a paused campaign is a no-op.
    ///
    /// An attempt already in flight finishes and is recorded; nothing new is
    /// dispatched until [`resume`](Self::resume).
    pub async fn pause(&self) -> HeraldResult<()> {
        let mut state = self.inner.state.lock().await;
        let campaign = state
            .campaign
            .as_mut()
            .ok_or(EngineError::NoActiveCampaign)?;

        match campaign.status {
            CampaignStatus::Paused => Ok(()),
            CampaignStatus::Running | CampaignStatus::BatchWaiting => {
                self.inner.set_status(campaign, CampaignStatus::Paused);
                reconciler::persist(&self.inner, campaign).await;
                self.inner
                    .emit(ProgressEvent::from_campaign(ProgressKind::Paused, campaign));
                info!(campaign_id = %campaign.campaign_id, index = campaign.current_index, "Campaign paused");
                Ok(())
            }
            other => Err(EngineError::InvalidTransition {
                from: other,
                action: "pause".to_string(),
            }
            .into()),
        }
    }

    /// Resume a paused campaign at the same position. Resuming a running
    /// campaign is a no-op.
    pub async fn resume(&self) -> HeraldResult<()> {
        let mut state = self.inner.state.lock().await;
        let campaign = state
            .campaign
            .as_mut()
            .ok_or(EngineError::NoActiveCampaign)?;

        match campaign.status {
            CampaignStatus::Running | CampaignStatus::BatchWaiting => {}
            CampaignStatus::Paused | CampaignStatus::Idle => {
                self.inner.set_status(campaign, CampaignStatus::Running);
                campaign.last_error = None;
                reconciler::persist(&self.inner, campaign).await;
                self.inner
                    .emit(ProgressEvent::from_campaign(ProgressKind::Resumed, campaign));
                info!(campaign_id = %campaign.campaign_id, index = campaign.current_index, "Campaign resumed");
            }
            other => {
                return Err(EngineError::InvalidTransition {
                    from: other,
                    action: "resume".to_string(),
                }
                .into())
            }
        }

        if !state.loop_active {
            dispatch::spawn(&self.inner, &mut state);
        }
        Ok(())
    }

    /// Abort the campaign. Terminal; not resumable.
    ///
    /// Every wait ends at once and an attempt in flight is discarded. The
    /// results are archived and the live checkpoint is removed.
    pub async fn abort(&self) -> HeraldResult<()> {
        let mut state = self.inner.state.lock().await;
        let campaign = state
            .campaign
            .as_mut()
            .ok_or(EngineError::NoActiveCampaign)?;

        if campaign.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: campaign.status,
                action: "abort".to_string(),
            }
            .into());
        }

        reconciler::abort(&self.inner, campaign).await;
        Ok(())
    }

    /// The campaign record with completion inference applied.
    pub async fn status(&self) -> Option<Campaign> {
        let state = self.inner.state.lock().await;
        state.campaign.as_ref().map(|campaign| {
            let mut snapshot = campaign.clone();
            snapshot.status = campaign.effective_status();
            snapshot
        })
    }

    pub async fn campaign_id(&self) -> Option<CampaignId> {
        let state = self.inner.state.lock().await;
        state.campaign.as_ref().map(|c| c.campaign_id.clone())
    }

    /// Whether a non-terminal campaign is loaded.
    pub async fn is_live(&self) -> bool {
        let state = self.inner.state.lock().await;
        state
            .campaign
            .as_ref()
            .map(|c| !c.status.is_terminal())
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.hub.subscribe()
    }

    /// Wait for the dispatch loop to stop (completion, pause, abort or
    /// failure).
    pub async fn join(&self) {
        loop {
            let handle = {
                let mut state = self.inner.state.lock().await;
                state.dispatch.take()
            };
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => return,
            }
        }
    }

    /// Reload a campaign persisted by an earlier process.
    ///
    /// The dedup ledger is rebuilt from the record alone, so identifiers it
    /// lists are never dispatched again. A record that was running restarts
    /// its dispatch loop at `current_index`; a paused record stays paused.
    pub async fn resume_from_checkpoint(
        &self,
        campaign_id: &CampaignId,
    ) -> HeraldResult<CampaignStatus> {
        let mut state = self.inner.state.lock().await;
        if let Some(current) = &state.campaign {
            if !current.status.is_terminal() {
                return Err(EngineError::AlreadyActive {
                    campaign_id: current.campaign_id.clone(),
                }
                .into());
            }
        }

        let mut campaign = self
            .inner
            .store
            .load(campaign_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                campaign_id: campaign_id.clone(),
            })?;

        campaign.sync_counts();
        let status = match campaign.status {
            CampaignStatus::Idle | CampaignStatus::Running | CampaignStatus::BatchWaiting => {
                CampaignStatus::Running
            }
            CampaignStatus::Paused => CampaignStatus::Paused,
            other => {
                return Err(EngineError::InvalidTransition {
                    from: other,
                    action: "resume".to_string(),
                }
                .into())
            }
        };
        self.inner.set_status(&mut campaign, status);
        info!(
            campaign_id = %campaign.campaign_id,
            index = campaign.current_index,
            attempted = campaign.ledger.len(),
            status = %status,
            "Campaign restored from checkpoint"
        );
        self.inner
            .emit(ProgressEvent::from_campaign(ProgressKind::Resumed, &campaign));

        state.campaign = Some(campaign);
        state.generation += 1;
        state.loop_active = false;
        state.attempt_started = None;
        state.chain = Arc::new(StrategyChain::standard());
        state.pacing = self.inner.new_pacing();
        if status == CampaignStatus::Running {
            dispatch::spawn(&self.inner, &mut state);
        }
        watchdog::spawn(&self.inner, state.generation);

        Ok(status)
    }
}

impl std::fmt::Debug for CampaignEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignEngine")
            .field("channel", &self.inner.channel.name())
            .field("status", &self.inner.signal.current())
            .finish()
    }
}
