//! LMDB-backed checkpoint store.
//!
//! Uses the heed crate (Rust bindings for LMDB). Every `save` runs in its own
//! write transaction, so a crash mid-write leaves the previous snapshot in
//! place.

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use herald_core::{Campaign, CampaignId, HeraldResult, LastResults};
use tracing::debug;

use crate::{
    campaign_id_from_key, campaign_key, decode, encode, last_results_key, CheckpointStore,
};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for herald_core::HeraldError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Transaction(reason) => {
                herald_core::HeraldError::Storage(herald_core::StorageError::WriteFailed { reason })
            }
            other => herald_core::HeraldError::Storage(herald_core::StorageError::ReadFailed {
                reason: other.to_string(),
            }),
        }
    }
}

/// Checkpoint store persisted in an LMDB environment on disk.
pub struct LmdbCheckpointStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCheckpointStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the environment
    /// cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        debug!(path = %path.as_ref().display(), "Opened LMDB checkpoint store");

        Ok(Self { env, db })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), LmdbStoreError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_bytes(), bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn delete(&self, key: &str) -> Result<bool, LmdbStoreError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn keys(&self) -> Result<Vec<String>, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => {
                    if let Ok(key) = std::str::from_utf8(key) {
                        keys.push(key.to_string());
                    }
                }
                Err(_) => continue,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl CheckpointStore for LmdbCheckpointStore {
    async fn save(&self, campaign: &Campaign) -> HeraldResult<()> {
        let bytes = encode(campaign)?;
        self.put(&campaign_key(&campaign.campaign_id), &bytes)?;
        Ok(())
    }

    async fn load(&self, campaign_id: &CampaignId) -> HeraldResult<Option<Campaign>> {
        match self.get(&campaign_key(campaign_id))? {
            Some(bytes) => Ok(Some(decode(campaign_id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn clear(&self, campaign_id: &CampaignId) -> HeraldResult<()> {
        let deleted = self.delete(&campaign_key(campaign_id))?;
        debug!(campaign_id = %campaign_id, deleted = deleted, "Cleared checkpoint");
        Ok(())
    }

    async fn save_last_results(&self, results: &LastResults) -> HeraldResult<()> {
        let bytes = encode(results)?;
        self.put(&last_results_key(&results.campaign_id), &bytes)?;
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
        Ok(self
            .keys()?
            .iter()
            .filter_map(|k| campaign_id_from_key(k))
            .collect())
    }
}
