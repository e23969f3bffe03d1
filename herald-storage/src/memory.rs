//! In-memory checkpoint store.

use crate::{
    campaign_id_from_key, campaign_key, decode, encode, last_results_key, CheckpointStore,
};
use async_trait::async_trait;
use herald_core::{Campaign, CampaignId, HeraldResult, LastResults, StorageError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Checkpoint store backed by a map of serialized records.
///
/// Records go through the same JSON encoding as the LMDB store, so tests
/// exercise the real round trip. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    records: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of records of any kind.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn put(&self, key: String, bytes: Vec<u8>) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                reason: "writes disabled".to_string(),
            });
        }
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(key, bytes);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, campaign: &Campaign) -> HeraldResult<()> {
        let bytes = encode(campaign)?;
        self.put(campaign_key(&campaign.campaign_id), bytes)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, campaign_id: &CampaignId) -> HeraldResult<Option<Campaign>> {
        match self.get(&campaign_key(campaign_id))? {
            Some(bytes) => Ok(Some(decode(campaign_id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self, campaign_id: &CampaignId) -> HeraldResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                reason: "writes disabled".to_string(),
            }
            .into());
        }
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.remove(&campaign_key(campaign_id));
        Ok(())
    }

    async fn save_last_results(&self, results: &LastResults) -> HeraldResult<()> {
        let bytes = encode(results)?;
        self.put(last_results_key(&results.campaign_id), bytes)?;
        Ok(())
    }

    async fn load_last_results(
        &self,
        campaign_id: &CampaignId,
    ) -> HeraldResult<Option<LastResults>> {
        match self.get(&last_results_key(campaign_id))? {
            Some(bytes) => Ok(Some(decode(campaign_id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> HeraldResult<Vec<CampaignId>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.keys().filter_map(|k| campaign_id_from_key(k)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{CampaignRequest, CampaignStatus, Contact, ContactOutcome, HeraldError};

    fn campaign(id: &str) -> Campaign {
        Campaign::prepare(
            CampaignRequest::new(
                vec![Contact::new("15550000001"), Contact::new("15550000002")],
                "hi {{name}}",
            )
            .with_id(id),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let store = InMemoryCheckpointStore::new();
        let mut record = campaign("cmp-1");
        record.record_outcome("15550000001", ContactOutcome::Succeeded, None);
        record.current_index = 1;

        store.save(&record).await.unwrap();
        let loaded = store.load(&record.campaign_id).await.unwrap().unwrap();

        assert_eq!(loaded, record);
        assert!(loaded.ledger.is_attempted("15550000001"));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let store = InMemoryCheckpointStore::new();
        let mut record = campaign("cmp-1");
        store.save(&record).await.unwrap();

        record.status = CampaignStatus::Paused;
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.campaign_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CampaignStatus::Paused);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_last_results() {
        let store = InMemoryCheckpointStore::new();
        let record = campaign("cmp-1");
        store.save(&record).await.unwrap();
        store
            .save_last_results(&LastResults::from_campaign(&record))
            .await
            .unwrap();

        store.clear(&record.campaign_id).await.unwrap();
        store.clear(&record.campaign_id).await.unwrap();

        assert!(store.load(&record.campaign_id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
        let results = store
            .load_last_results(&record.campaign_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(results.total, 2);
    }

    #[tokio::test]
    async fn test_failed_writes_surface_as_storage_errors() {
        let store = InMemoryCheckpointStore::new();
        store.set_fail_writes(true);

        let err = store.save(&campaign("cmp-1")).await.unwrap_err();
        assert!(matches!(
            err,
            HeraldError::Storage(StorageError::WriteFailed { .. })
        ));
        assert_eq!(store.save_count(), 0);

        store.set_fail_writes(false);
        assert!(store.save(&campaign("cmp-1")).await.is_ok());
    }
}
