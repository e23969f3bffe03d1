//! HERALD campaign runner
//!
//! Runs one campaign described by a JSON file against the dry-run channel,
//! checkpointing to LMDB. Running it again with the same campaign id resumes
//! the saved campaign instead of starting over.
//!
//! ```text
//! herald-run campaign.json
//! ```
//!
//! Environment:
//!
//! - `HERALD_DATA_DIR` checkpoint directory (default `./herald-data`)
//! - `HERALD_LMDB_SIZE_MB` map size (default 64)
//! - `HERALD_LOG_JSON` JSON log lines when `true`
//! - `HERALD_*` engine tuning, see `EngineConfig::from_env`

use herald_core::{
    CampaignId, CampaignRequest, CampaignStatus, ConfigError, EngineConfig, HeraldResult,
    ProgressKind, ValidationError,
};
use herald_delivery::DryRunChannel;
use herald_engine::{init_tracing, AllowAll, CampaignEngine};
use herald_storage::{CheckpointStore, LmdbCheckpointStore};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> HeraldResult<()> {
    let json_logs = std::env::var("HERALD_LOG_JSON")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    init_tracing(json_logs)?;

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "campaign file".to_string(),
        })?;
    let request = read_request(&path)?;

    let config = EngineConfig::from_env();
    config.validate()?;

    let data_dir = std::env::var("HERALD_DATA_DIR").unwrap_or_else(|_| "./herald-data".to_string());
    let map_size_mb = std::env::var("HERALD_LMDB_SIZE_MB")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(64);
    std::fs::create_dir_all(&data_dir).map_err(|e| ConfigError::InvalidValue {
        field: "HERALD_DATA_DIR".to_string(),
        value: data_dir.clone(),
        reason: e.to_string(),
    })?;
    let store = Arc::new(LmdbCheckpointStore::open(&data_dir, map_size_mb)?);

    let engine = CampaignEngine::builder(Arc::new(DryRunChannel::new()), store.clone())
        .gate(Arc::new(AllowAll))
        .config(config)
        .build()?;

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{}", line);
                    }
                    if matches!(
                        event.kind,
                        ProgressKind::Completed | ProgressKind::Aborted | ProgressKind::CampaignFailed
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let campaign_id = start_or_resume(&engine, store.as_ref(), request).await?;
    tracing::info!(campaign_id = %campaign_id, "Campaign running; Ctrl-C pauses");

    tokio::select! {
        _ = engine.join() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received; pausing campaign");
            engine.pause().await?;
            engine.join().await;
            printer.abort();
        }
    }

    if let Some(campaign) = engine.status().await {
        tracing::info!(
            campaign_id = %campaign.campaign_id,
            status = %campaign.status,
            sent = campaign.sent_count,
            failed = campaign.failed_count,
            total = campaign.total(),
            "Runner finished"
        );
    }
    let _ = printer.await;
    Ok(())
}

fn read_request(path: &str) -> HeraldResult<CampaignRequest> {
    let raw = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidValue {
        field: "campaign file".to_string(),
        reason: format!("{}: {}", path, e),
    })?;
    let request = serde_json::from_str(&raw).map_err(|e| ValidationError::InvalidValue {
        field: "campaign file".to_string(),
        reason: format!("{}: {}", path, e),
    })?;
    Ok(request)
}

/// Resume the campaign when a checkpoint exists for its id, start it
/// otherwise.
async fn start_or_resume(
    engine: &CampaignEngine,
    store: &dyn CheckpointStore,
    request: CampaignRequest,
) -> HeraldResult<CampaignId> {
    if let Some(campaign_id) = request.campaign_id.clone() {
        if store.load(&campaign_id).await?.is_some() {
            let status = engine.resume_from_checkpoint(&campaign_id).await?;
            if status == CampaignStatus::Paused {
                engine.resume().await?;
            }
            return Ok(campaign_id);
        }
    }
    engine.start(request).await
}
