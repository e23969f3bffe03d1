//! Restart and resume from persisted checkpoints.

use herald_core::{
    Campaign, CampaignId, CampaignStatus, ContactOutcome, EngineError, HeraldError,
    PacingConfig, ProgressKind, RandomRange, StorageError,
};
use herald_engine::AllowAll;
use herald_storage::{CheckpointStore, LmdbCheckpointStore};
use herald_test_utils::assertions::{assert_no_duplicates, assert_partition, assert_status};
use herald_test_utils::fixtures::{identifier, request, test_config};
use herald_test_utils::{InMemoryCheckpointStore, ScriptedChannel};
use std::sync::Arc;
use tempfile::TempDir;
#[path = "support/engine.rs"]
mod test_engine_support;
use test_engine_support::{build_engine, test_engine, wait_for};

fn delayed(seconds: u32) -> PacingConfig {
    PacingConfig {
        random_delay: Some(RandomRange::fixed(seconds)),
        ..PacingConfig::default()
    }
}

/// A record as a crashed process would have left it: `done` contacts
/// delivered, still running.
fn interrupted_campaign(id: &str, total: usize, done: usize) -> Campaign {
    let mut campaign =
        Campaign::prepare(request(total).with_id(id).with_pacing(PacingConfig::immediate()))
            .unwrap();
    for n in 1..=done {
        campaign.record_outcome(&identifier(n), ContactOutcome::Succeeded, None);
    }
    campaign.current_index = done;
    campaign
}

#[tokio::test(start_paused = true)]
async fn test_restart_never_redispatches() {
    let first_channel = ScriptedChannel::new();
    let first_store = InMemoryCheckpointStore::new();
    let first = test_engine(&first_channel, &first_store);
    let mut rx = first.subscribe();

    let campaign_id = first
        .start(request(4).with_pacing(delayed(5)))
        .await
        .unwrap();
    wait_for(&mut rx, ProgressKind::Delivered, 2).await;
    first.status().await.unwrap();
    let snapshot = first_store.load(&campaign_id).await.unwrap().unwrap();
    first.abort().await.unwrap();

    assert_eq!(snapshot.ledger.len(), 2);
    assert!(snapshot.resume_at.is_some());

    let second_channel = ScriptedChannel::new();
    let second_store = InMemoryCheckpointStore::new();
    second_store.save(&snapshot).await.unwrap();
    let second = test_engine(&second_channel, &second_store);

    let status = second.resume_from_checkpoint(&campaign_id).await.unwrap();
    assert_eq!(status, CampaignStatus::Running);
    second.join().await;

    assert_eq!(second_channel.sent(), vec![identifier(3), identifier(4)]);
    let mut all_sent = first_channel.sent();
    all_sent.extend(second_channel.sent());
    assert_no_duplicates(&all_sent);

    let campaign = second.status().await.unwrap();
    assert_status(&campaign, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 4);
    assert_partition(&campaign);
}

#[tokio::test(start_paused = true)]
async fn test_ledger_wins_over_stale_index() {
    let channel = ScriptedChannel::new();
    let store = InMemoryCheckpointStore::new();
    let mut record = interrupted_campaign("cmp-stale", 4, 3);
    record.current_index = 1;
    store.save(&record).await.unwrap();

    let engine = test_engine(&channel, &store);
    engine
        .resume_from_checkpoint(&CampaignId::from("cmp-stale"))
        .await
        .unwrap();
    engine.join().await;

    assert_eq!(channel.sent(), vec![identifier(4)]);
    assert_eq!(engine.status().await.unwrap().sent_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_paused_checkpoint_stays_paused() {
    let channel = ScriptedChannel::new();
    let store = InMemoryCheckpointStore::new();
    let mut record = interrupted_campaign("cmp-paused", 3, 1);
    record.status = CampaignStatus::Paused;
    store.save(&record).await.unwrap();

    let engine = test_engine(&channel, &store);
    let status = engine
        .resume_from_checkpoint(&CampaignId::from("cmp-paused"))
        .await
        .unwrap();
    assert_eq!(status, CampaignStatus::Paused);

    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    assert!(channel.sent().is_empty());

    engine.resume().await.unwrap();
    engine.join().await;
    assert_eq!(channel.sent(), vec![identifier(2), identifier(3)]);
}

#[tokio::test(start_paused = true)]
async fn test_counters_rebuilt_from_ledger() {
    let channel = ScriptedChannel::new();
    let store = InMemoryCheckpointStore::new();
    let mut record = interrupted_campaign("cmp-drift", 3, 2);
    record.sent_count = 0;
    record.failed_count = 7;
    store.save(&record).await.unwrap();

    let engine = test_engine(&channel, &store);
    engine
        .resume_from_checkpoint(&CampaignId::from("cmp-drift"))
        .await
        .unwrap();
    engine.join().await;

    let campaign = engine.status().await.unwrap();
    assert_eq!(campaign.sent_count, 3);
    assert_eq!(campaign.failed_count, 0);
}

#[tokio::test]
async fn test_missing_checkpoint_is_not_found() {
    let channel = ScriptedChannel::new();
    let store = InMemoryCheckpointStore::new();
    let engine = test_engine(&channel, &store);

    let result = engine
        .resume_from_checkpoint(&CampaignId::from("cmp-missing"))
        .await;
    assert!(matches!(
        result,
        Err(HeraldError::Storage(StorageError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_terminal_checkpoint_cannot_resume() {
    let channel = ScriptedChannel::new();
    let store = InMemoryCheckpointStore::new();
    let mut record = interrupted_campaign("cmp-over", 2, 2);
    record.status = CampaignStatus::Aborted;
    store.save(&record).await.unwrap();

    let engine = test_engine(&channel, &store);
    let result = engine
        .resume_from_checkpoint(&CampaignId::from("cmp-over"))
        .await;
    assert!(matches!(
        result,
        Err(HeraldError::Engine(EngineError::InvalidTransition { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_resume_from_lmdb_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let record = interrupted_campaign("cmp-durable", 5, 2);
    {
        let store = LmdbCheckpointStore::open(temp_dir.path(), 10).unwrap();
        store.save(&record).await.unwrap();
    }

    let store = Arc::new(LmdbCheckpointStore::open(temp_dir.path(), 10).unwrap());
    let channel = ScriptedChannel::new();
    let engine = build_engine(&channel, store.clone(), test_config(), Arc::new(AllowAll));

    engine
        .resume_from_checkpoint(&record.campaign_id)
        .await
        .unwrap();
    engine.join().await;

    assert_eq!(
        channel.sent(),
        vec![identifier(3), identifier(4), identifier(5)]
    );
    assert!(store.load(&record.campaign_id).await.unwrap().is_none());
    let results = store
        .load_last_results(&record.campaign_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(results.sent_count, 5);
    assert_eq!(results.status, CampaignStatus::Completed);
}
