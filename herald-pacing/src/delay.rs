//! Per-message delay computation.

use herald_core::{Attachment, AttachmentKind, PacingConfig, RandomRange};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Delay used when no pacing rule applies.
pub const FALLBACK_DELAY: Duration = Duration::from_secs(2);

/// Largest legacy delay still read as seconds; larger values are minutes.
const LEGACY_SECONDS_LIMIT: u32 = 60;

/// Source of every random pacing decision of a campaign.
#[derive(Debug, Clone)]
pub struct PacingController {
    rng: StdRng,
}

impl PacingController {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic controller for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw from an inclusive range.
    pub fn draw(&mut self, range: RandomRange) -> u32 {
        if range.min >= range.max {
            return range.min;
        }
        self.rng.random_range(range.min..=range.max)
    }

    /// Delay to apply after a message, jitter included.
    pub fn message_delay(
        &mut self,
        pacing: &PacingConfig,
        attachment: Option<&Attachment>,
    ) -> Duration {
        let base = self.base_delay(pacing, attachment);
        if pacing.human_pattern {
            base + self.human_jitter(base, pacing.human_intensity)
        } else {
            base
        }
    }

    /// Base per-message delay. The first matching rule wins:
    ///
    /// 1. random range, in seconds
    /// 2. legacy fixed delay (seconds up to 60, minutes above)
    /// 3. turbo defaults by payload
    /// 4. [`FALLBACK_DELAY`]
    pub fn base_delay(&mut self, pacing: &PacingConfig, attachment: Option<&Attachment>) -> Duration {
        if let Some(range) = pacing.random_delay {
            return Duration::from_secs(u64::from(self.draw(range)));
        }
        if let Some(value) = pacing.legacy_delay {
            return legacy_delay(value);
        }
        if pacing.turbo {
            return turbo_delay(attachment);
        }
        FALLBACK_DELAY
    }

    /// Irregular extra wait on top of `base`.
    ///
    /// Up to half of `base` scaled by intensity, plus a small
    /// intensity-scaled chance (5-10%) of an extra 5-15 s pause.
    pub fn human_jitter(&mut self, base: Duration, intensity: u8) -> Duration {
        let scale = f64::from(intensity.min(100)) / 100.0;
        if scale == 0.0 {
            return Duration::ZERO;
        }

        let fraction = self.rng.random_range(0.0..=0.5) * scale;
        let mut jitter = base.mul_f64(fraction);

        let chance = self.rng.random_range(0.05..=0.10) * scale;
        if self.rng.random_bool(chance) {
            jitter += Duration::from_secs(self.rng.random_range(5..=15));
        }
        jitter
    }

    /// Messages until the next safety ping.
    pub fn draw_ping_threshold(&mut self, range: (u32, u32)) -> u32 {
        self.draw(RandomRange::new(range.0, range.1)).max(1)
    }
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new()
    }
}

fn legacy_delay(value: u32) -> Duration {
    if value <= LEGACY_SECONDS_LIMIT {
        Duration::from_secs(u64::from(value))
    } else {
        Duration::from_secs(u64::from(value) * 60)
    }
}

fn turbo_delay(attachment: Option<&Attachment>) -> Duration {
    match attachment.map(Attachment::kind) {
        None => Duration::from_secs(1),
        Some(AttachmentKind::Image) => Duration::from_secs(3),
        Some(_) => Duration::from_secs(2),
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Jitter never exceeds half the base plus the longest extra pause.
        #[test]
        fn prop_jitter_is_bounded(
            seed in any::<u64>(),
            base_ms in 0u64..120_000,
            intensity in 0u8..=100,
        ) {
            let mut pacing = PacingController::seeded(seed);
            let base = Duration::from_millis(base_ms);
            let jitter = pacing.human_jitter(base, intensity);
            prop_assert!(jitter <= base / 2 + Duration::from_secs(15));
        }

        /// A random range delay always lands inside the range.
        #[test]
        fn prop_random_delay_in_range(seed in any::<u64>(), min in 0u32..600, span in 0u32..600) {
            let mut pacing = PacingController::seeded(seed);
            let config = PacingConfig {
                random_delay: Some(RandomRange::new(min, min + span)),
                ..PacingConfig::default()
            };
            let delay = pacing.base_delay(&config, None).as_secs() as u32;
            prop_assert!(delay >= min && delay <= min + span);
        }
    }
}
