//! HERALD Storage - Checkpoint Store
//!
//! Durable snapshots of campaign records and the archived results of finished
//! campaigns. The dispatch engine is the only writer.
//!
//! Two implementations ship here:
//!
//! - [`InMemoryCheckpointStore`] for tests and single-process runs
//! - [`LmdbCheckpointStore`] for durability across restarts
//!
//! Both store records as JSON under string keys (`campaign:<id>` and
//! `last_results:<id>`), so a record read back is exactly what was written.

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbCheckpointStore, LmdbStoreError};
pub use memory::InMemoryCheckpointStore;

use async_trait::async_trait;
use herald_core::{Campaign, CampaignId, HeraldResult, LastResults, StorageError};
use serde::{de::DeserializeOwned, Serialize};

const CAMPAIGN_PREFIX: &str = "campaign:";
const LAST_RESULTS_PREFIX: &str = "last_results:";

// ============================================================================
// CHECKPOINT STORE TRAIT
// ============================================================================

/// Durable storage for campaign checkpoints.
///
/// `save` replaces the whole record atomically: a reader sees either the
/// previous snapshot or the new one, never a mix.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the live record of a campaign.
    async fn save(&self, campaign: &Campaign) -> HeraldResult<()>;

    /// Load the live record of a campaign, if any.
    async fn load(&self, campaign_id: &CampaignId) -> HeraldResult<Option<Campaign>>;

    /// Remove the live record. Clearing a missing record is not an error.
    async fn clear(&self, campaign_id: &CampaignId) -> HeraldResult<()>;

    /// Archive the results of a finished campaign.
    async fn save_last_results(&self, results: &LastResults) -> HeraldResult<()>;

    /// Load archived results.
    async fn load_last_results(&self, campaign_id: &CampaignId)
        -> HeraldResult<Option<LastResults>>;

    /// Ids of all campaigns with a live record.
    async fn list(&self) -> HeraldResult<Vec<CampaignId>>;
}

// ============================================================================
// KEY AND VALUE ENCODING
// ============================================================================

pub(crate) fn campaign_key(campaign_id: &CampaignId) -> String {
    format!("{}{}", CAMPAIGN_PREFIX, campaign_id)
}

pub(crate) fn last_results_key(campaign_id: &CampaignId) -> String {
    format!("{}{}", LAST_RESULTS_PREFIX, campaign_id)
}

/// Campaign id encoded in a live-record key.
pub(crate) fn campaign_id_from_key(key: &str) -> Option<CampaignId> {
    key.strip_prefix(CAMPAIGN_PREFIX).map(CampaignId::from)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::WriteFailed {
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(
    campaign_id: &CampaignId,
    bytes: &[u8],
) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt {
        campaign_id: campaign_id.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let id = CampaignId::new("cmp-7");
        assert_eq!(campaign_key(&id), "campaign:cmp-7");
        assert_eq!(last_results_key(&id), "last_results:cmp-7");
        assert_eq!(campaign_id_from_key("campaign:cmp-7"), Some(id));
        assert_eq!(campaign_id_from_key("last_results:cmp-7"), None);
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let id = CampaignId::new("cmp-7");
        let err = decode::<Campaign>(&id, b"{not json").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
