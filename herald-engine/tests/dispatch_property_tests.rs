//! Property tests over whole campaigns: every contact lands in exactly one
//! outcome list and nothing is dispatched twice.

use herald_core::{CampaignRequest, CampaignStatus, PacingConfig};
use herald_test_utils::assertions::{assert_no_duplicates, assert_partition};
use herald_test_utils::generators::{arb_contacts, arb_immediate_pacing};
use herald_test_utils::{InMemoryCheckpointStore, ScriptedChannel};
use proptest::prelude::*;
#[path = "support/engine.rs"]
mod test_engine_support;
use test_engine_support::test_engine;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

mod prop_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_campaign_partitions_contacts(
            contacts in arb_contacts(12),
            pacing in arb_immediate_pacing(),
        ) {
            let channel = ScriptedChannel::new();
            let store = InMemoryCheckpointStore::new();
            let campaign = paused_runtime().block_on(async {
                let engine = test_engine(&channel, &store);
                let request = CampaignRequest::new(contacts, "Hi {{name}}").with_pacing(pacing);
                engine.start(request).await.unwrap();
                engine.join().await;
                engine.status().await.unwrap()
            });

            prop_assert_eq!(campaign.status, CampaignStatus::Completed);
            assert_partition(&campaign);
            assert_no_duplicates(&channel.sent());
            prop_assert_eq!(campaign.sent_count, channel.sent().len());
        }

        #[test]
        fn prop_failing_numbers_never_count_as_sent(
            contacts in arb_contacts(8),
        ) {
            let mut channel = ScriptedChannel::new();
            for contact in contacts.iter().step_by(2) {
                channel = channel.invalid_number(&contact.normalized());
            }
            let store = InMemoryCheckpointStore::new();
            let campaign = paused_runtime().block_on(async {
                let engine = test_engine(&channel, &store);
                let request = CampaignRequest::new(contacts, "Hi").with_pacing(PacingConfig::immediate());
                engine.start(request).await.unwrap();
                engine.join().await;
                engine.status().await.unwrap()
            });

            assert_partition(&campaign);
            prop_assert_eq!(campaign.sent_count, channel.sent().len());
            prop_assert!(campaign.sent_count + campaign.failed_count == campaign.total());
        }
    }
}
