//! Registry of engines keyed by campaign id.
//!
//! Lets a host run several campaigns side by side, one engine each, while
//! refusing a second live engine for the same campaign id.

use crate::engine::CampaignEngine;
use herald_core::{CampaignId, CampaignRequest, EngineError, HeraldResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<CampaignId, CampaignEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `engine` under `campaign_id`.
    ///
    /// # Errors
    ///
    /// `EngineError::AlreadyActive` when a live engine already holds the id.
    pub async fn register(
        &self,
        campaign_id: CampaignId,
        engine: CampaignEngine,
    ) -> Result<(), EngineError> {
        let mut engines = self.engines.write().await;
        if let Some(existing) = engines.get(&campaign_id) {
            if existing.is_live().await {
                return Err(EngineError::AlreadyActive { campaign_id });
            }
        }
        debug!(campaign_id = %campaign_id, "Engine registered");
        engines.insert(campaign_id, engine);
        Ok(())
    }

    /// Register `engine` and start `request` on it. The registration is
    /// rolled back when the start fails.
    pub async fn start(
        &self,
        engine: CampaignEngine,
        mut request: CampaignRequest,
    ) -> HeraldResult<CampaignId> {
        let campaign_id = request
            .campaign_id
            .get_or_insert_with(CampaignId::generate)
            .clone();
        self.register(campaign_id.clone(), engine.clone()).await?;

        match engine.start(request).await {
            Ok(id) => Ok(id),
            Err(e) => {
                self.engines.write().await.remove(&campaign_id);
                Err(e)
            }
        }
    }

    pub async fn get(&self, campaign_id: &CampaignId) -> Option<CampaignEngine> {
        self.engines.read().await.get(campaign_id).cloned()
    }

    pub async fn remove(&self, campaign_id: &CampaignId) -> Option<CampaignEngine> {
        self.engines.write().await.remove(campaign_id)
    }

    /// Ids of engines whose campaign has not finished.
    pub async fn live(&self) -> Vec<CampaignId> {
        let engines = self.engines.read().await;
        let mut live = Vec::new();
        for (campaign_id, engine) in engines.iter() {
            if engine.is_live().await {
                live.push(campaign_id.clone());
            }
        }
        live.sort();
        live
    }

    /// Drop engines whose campaign finished. Returns how many were dropped.
    pub async fn prune(&self) -> usize {
        let mut engines = self.engines.write().await;
        let mut finished = Vec::new();
        for (campaign_id, engine) in engines.iter() {
            if !engine.is_live().await {
                finished.push(campaign_id.clone());
            }
        }
        for campaign_id in &finished {
            engines.remove(campaign_id);
        }
        finished.len()
    }

    pub async fn len(&self) -> usize {
        self.engines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.engines.read().await.is_empty()
    }
}
