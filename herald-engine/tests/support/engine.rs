#![allow(dead_code)]

use herald_core::{CampaignStatus, EngineConfig, ProgressEvent, ProgressKind};
use herald_engine::{AllowAll, CampaignEngine, EntitlementGate};
use herald_storage::CheckpointStore;
use herald_test_utils::fixtures::test_config;
use herald_test_utils::{InMemoryCheckpointStore, ScriptedChannel};
use std::sync::Arc;
use tokio::sync::broadcast;

pub fn test_engine(channel: &ScriptedChannel, store: &InMemoryCheckpointStore) -> CampaignEngine {
    build_engine(
        channel,
        Arc::new(store.clone()),
        test_config(),
        Arc::new(AllowAll),
    )
}

pub fn build_engine(
    channel: &ScriptedChannel,
    store: Arc<dyn CheckpointStore>,
    config: EngineConfig,
    gate: Arc<dyn EntitlementGate>,
) -> CampaignEngine {
    CampaignEngine::builder(Arc::new(channel.clone()), store)
        .config(config)
        .gate(gate)
        .seed(7)
        .build()
        .expect("Failed to build test engine")
}

/// Receive events until `count` events of `kind` have been seen.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<ProgressEvent>,
    kind: ProgressKind,
    count: usize,
) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    let mut matched = 0;
    while matched < count {
        let event = rx.recv().await.expect("Progress stream closed");
        if event.kind == kind {
            matched += 1;
        }
        seen.push(event);
    }
    seen
}

pub async fn current_status(engine: &CampaignEngine) -> CampaignStatus {
    engine
        .status()
        .await
        .map(|campaign| campaign.status)
        .unwrap_or(CampaignStatus::Idle)
}
