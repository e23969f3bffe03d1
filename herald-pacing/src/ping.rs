//! Safety ping scheduling.

use crate::PacingController;
use herald_core::Campaign;

/// Decides when a keep-alive ping is due.
///
/// The threshold is re-drawn from the configured range after every ping, so
/// pings do not fall on a fixed rhythm.
pub struct SafetyPing<'a> {
    controller: &'a mut PacingController,
    every: (u32, u32),
}

impl<'a> SafetyPing<'a> {
    pub fn new(controller: &'a mut PacingController, every: (u32, u32)) -> Self {
        Self { controller, every }
    }

    /// Account for one dispatched message. Returns `true` when a ping is due.
    pub fn on_dispatched(&mut self, campaign: &mut Campaign) -> bool {
        if !campaign.pacing.safety_ping {
            return false;
        }
        if campaign.ping.next_ping_after == 0 {
            campaign.ping.next_ping_after = self.controller.draw_ping_threshold(self.every);
        }
        campaign.ping.since_ping += 1;
        if campaign.ping.since_ping < campaign.ping.next_ping_after {
            return false;
        }
        campaign.ping.since_ping = 0;
        campaign.ping.next_ping_after = self.controller.draw_ping_threshold(self.every);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{CampaignRequest, Contact, PacingConfig};

    fn campaign(safety_ping: bool) -> Campaign {
        let pacing = PacingConfig {
            safety_ping,
            ..PacingConfig::immediate()
        };
        Campaign::prepare(
            CampaignRequest::new(vec![Contact::new("15550000001")], "hi").with_pacing(pacing),
        )
        .unwrap()
    }

    #[test]
    fn test_ping_interval_within_range() {
        let mut record = campaign(true);
        let mut controller = PacingController::seeded(9);
        let mut ping = SafetyPing::new(&mut controller, (10, 15));

        let mut last = 0;
        let mut gaps = Vec::new();
        for sent in 1..=200 {
            if ping.on_dispatched(&mut record) {
                gaps.push(sent - last);
                last = sent;
            }
        }
        assert!(!gaps.is_empty());
        assert!(gaps.iter().all(|gap| (10..=15).contains(gap)));
    }

    #[test]
    fn test_disabled_never_pings() {
        let mut record = campaign(false);
        let mut controller = PacingController::seeded(9);
        let mut ping = SafetyPing::new(&mut controller, (10, 15));
        assert!((0..100).all(|_| !ping.on_dispatched(&mut record)));
        assert_eq!(record.ping.since_ping, 0);
    }
}
