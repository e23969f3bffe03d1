//! HERALD Pacing - Delays, Batches and Safety Pings
//!
//! Pure computation over a campaign record. Nothing here sleeps: the engine
//! turns the durations computed here into controlled waits.
//!
//! Randomness comes from one [`PacingController`] per campaign, which can be
//! seeded for reproducible runs.

pub mod batch;
pub mod delay;
pub mod ping;

pub use batch::{BatchPlanner, BatchWait};
pub use delay::{PacingController, FALLBACK_DELAY};
pub use ping::SafetyPing;
