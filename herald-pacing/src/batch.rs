//! Batch planning.
//!
//! Batch `n + 1` is planned (size and wait drawn) when batch `n` starts, so
//! the plan always runs exactly one entry ahead. Entries are never removed.

use crate::PacingController;
use herald_core::{BatchPacing, BatchPlanEntry, BatchStatus, Campaign};
use std::time::Duration;
use tracing::debug;

/// An inter-batch wait the engine must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWait {
    /// Batch that just finished
    pub batch_number: u32,
    pub duration: Duration,
}

/// Drives the batch cursor and plan of a campaign.
pub struct BatchPlanner<'a> {
    controller: &'a mut PacingController,
}

impl<'a> BatchPlanner<'a> {
    pub fn new(controller: &'a mut PacingController) -> Self {
        Self { controller }
    }

    /// Account for one dispatched message.
    ///
    /// Returns the wait to perform when this message closed its batch and
    /// more contacts remain. Does nothing when batching is off.
    pub fn on_dispatched(&mut self, campaign: &mut Campaign, more_remaining: bool) -> Option<BatchWait> {
        let batch = campaign.pacing.batch?;
        if campaign.batch.batch_number == 0 {
            self.start_first(campaign, batch);
        }

        campaign.batch.sent_in_batch += 1;
        let number = campaign.batch.batch_number;
        if campaign.batch.sent_in_batch < campaign.batch.batch_size {
            return None;
        }

        if !more_remaining {
            set_status(campaign, number, BatchStatus::Completed);
            return None;
        }

        set_status(campaign, number, BatchStatus::Waiting);
        let minutes = entry(campaign, number).map(|e| e.wait_minutes).unwrap_or(0);
        debug!(
            campaign_id = %campaign.campaign_id,
            batch = number,
            wait_minutes = minutes,
            "Batch finished"
        );
        Some(BatchWait {
            batch_number: number,
            duration: Duration::from_secs(u64::from(minutes) * 60),
        })
    }

    /// Move from a finished (waited-out) batch to the next planned one.
    pub fn start_next(&mut self, campaign: &mut Campaign) {
        let Some(batch) = campaign.pacing.batch else {
            return;
        };
        let finished = campaign.batch.batch_number;
        set_status(campaign, finished, BatchStatus::Completed);

        let next = finished + 1;
        if entry(campaign, next).is_none() {
            self.plan(campaign, next, batch);
        }
        self.run(campaign, next, batch);
    }

    fn start_first(&mut self, campaign: &mut Campaign, batch: BatchPacing) {
        if entry(campaign, 1).is_none() {
            self.plan(campaign, 1, batch);
        }
        self.run(campaign, 1, batch);
    }

    fn run(&mut self, campaign: &mut Campaign, number: u32, batch: BatchPacing) {
        set_status(campaign, number, BatchStatus::Running);
        let size = entry(campaign, number).map(|e| e.size).unwrap_or(1).max(1);
        campaign.batch.batch_number = number;
        campaign.batch.sent_in_batch = 0;
        campaign.batch.batch_size = size;
        if entry(campaign, number + 1).is_none() {
            self.plan(campaign, number + 1, batch);
        }
    }

    fn plan(&mut self, campaign: &mut Campaign, number: u32, batch: BatchPacing) {
        let entry = BatchPlanEntry {
            batch_number: number,
            size: self.controller.draw(batch.size).max(1),
            wait_minutes: self.controller.draw(batch.delay_minutes),
            status: BatchStatus::Queued,
        };
        campaign.batch_plan.push(entry);
    }
}

fn entry(campaign: &Campaign, number: u32) -> Option<&BatchPlanEntry> {
    campaign.batch_plan.iter().find(|e| e.batch_number == number)
}

fn set_status(campaign: &mut Campaign, number: u32, status: BatchStatus) {
    if let Some(entry) = campaign
        .batch_plan
        .iter_mut()
        .find(|e| e.batch_number == number)
    {
        entry.status = status;
    }
}
