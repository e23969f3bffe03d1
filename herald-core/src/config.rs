//! Configuration types

use crate::{AttachmentFallback, ConfigError, HeraldResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default buffer of the progress broadcast channel.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 1024;

// ============================================================================
// PACING CONFIGURATION (per campaign)
// ============================================================================

/// Inclusive integer range drawn from uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomRange {
    pub min: u32,
    pub max: u32,
}

impl RandomRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// A range that always yields `value`.
    pub fn fixed(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidRange {
                field: field.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Batch pacing: dispatch in batches with a pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPacing {
    /// Contacts per batch, drawn fresh for every batch
    pub size: RandomRange,
    /// Wait between batches, in minutes
    pub delay_minutes: RandomRange,
}

/// Per-campaign pacing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Batch pacing, if enabled
    #[serde(default)]
    pub batch: Option<BatchPacing>,
    /// Randomized per-message delay in seconds, if enabled
    #[serde(default)]
    pub random_delay: Option<RandomRange>,
    /// Fixed delay: seconds when <= 60, minutes otherwise
    #[serde(default)]
    pub legacy_delay: Option<u32>,
    /// Use payload-dependent short defaults
    #[serde(default)]
    pub turbo: bool,
    /// Add irregular human-like jitter
    #[serde(default)]
    pub human_pattern: bool,
    /// Jitter intensity, 0-100
    #[serde(default = "default_human_intensity")]
    pub human_intensity: u8,
    /// Send periodic keep-alive pings
    #[serde(default)]
    pub safety_ping: bool,
}

fn default_human_intensity() -> u8 {
    50
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            batch: None,
            random_delay: None,
            legacy_delay: None,
            turbo: false,
            human_pattern: false,
            human_intensity: default_human_intensity(),
            safety_ping: false,
        }
    }
}

impl PacingConfig {
    /// No delays at all.
    pub fn immediate() -> Self {
        Self {
            legacy_delay: Some(0),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HeraldResult<()> {
        if let Some(batch) = &self.batch {
            batch.size.validate("pacing.batch.size")?;
            batch.delay_minutes.validate("pacing.batch.delay_minutes")?;
            if batch.size.min == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "pacing.batch.size.min".to_string(),
                    value: "0".to_string(),
                    reason: "batch size must be at least 1".to_string(),
                }
                .into());
            }
        }
        if let Some(range) = &self.random_delay {
            range.validate("pacing.random_delay")?;
        }
        if self.human_intensity > 100 {
            return Err(ConfigError::InvalidValue {
                field: "pacing.human_intensity".to_string(),
                value: self.human_intensity.to_string(),
                reason: "intensity must be between 0 and 100".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// ENGINE CONFIGURATION (per process)
// ============================================================================

/// Timeouts, intervals and policies of the dispatch engine.
///
/// Every wait the engine performs is bounded by one of these values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Granularity at which waits re-check the campaign status (<= 1s)
    pub poll_interval: Duration,
    /// How long the fast path may take to become ready
    pub fast_path_ready_timeout: Duration,
    /// Bound on waiting for a conversation (or invalid marker) to appear
    pub conversation_timeout: Duration,
    /// Bound on the pre-send validity probe
    pub validity_timeout: Duration,
    /// Window after send in which a late invalid marker downgrades success
    pub post_send_window: Duration,
    /// Bound on waiting for the sent indicator of text-only sends
    pub sent_confirmation_timeout: Duration,
    /// Pause after a conversation opens before typing
    pub settle_delay: Duration,
    /// Bound on any single call into the delivery channel
    #[serde(default = "default_channel_call_timeout")]
    pub channel_call_timeout: Duration,
    /// Navigation retries when UI elements are missing
    pub navigation_retries: u32,
    /// How long a campaign may sit at total-1 before completion is forced.
    /// While an attempt is in flight the grace starts only once the attempt
    /// has outlived [`attempt_budget`](Self::attempt_budget).
    pub stuck_grace: Duration,
    /// How often the stuck-campaign watchdog looks
    pub watchdog_interval: Duration,
    /// How often entitlement is re-checked while running
    pub entitlement_recheck: Duration,
    /// Messages between safety pings, drawn per ping
    pub safety_ping_every: (u32, u32),
    /// Text of the self-directed keep-alive message
    pub keep_alive_text: String,
    /// Policy when an attachment cannot be injected
    pub attachment_fallback: AttachmentFallback,
    /// Capacity of the progress broadcast channel
    pub progress_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            fast_path_ready_timeout: Duration::from_secs(3),
            conversation_timeout: Duration::from_secs(20),
            validity_timeout: Duration::from_secs(4),
            post_send_window: Duration::from_secs(3),
            sent_confirmation_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            channel_call_timeout: default_channel_call_timeout(),
            navigation_retries: 2,
            stuck_grace: Duration::from_secs(15),
            watchdog_interval: Duration::from_secs(1),
            entitlement_recheck: Duration::from_secs(600),
            safety_ping_every: (10, 15),
            keep_alive_text: ".".to_string(),
            attachment_fallback: AttachmentFallback::FailClosed,
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Short timeouts for local runs and tests.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            fast_path_ready_timeout: Duration::from_millis(100),
            conversation_timeout: Duration::from_millis(500),
            validity_timeout: Duration::from_millis(100),
            post_send_window: Duration::from_millis(100),
            sent_confirmation_timeout: Duration::from_millis(200),
            settle_delay: Duration::from_millis(10),
            channel_call_timeout: Duration::from_secs(1),
            navigation_retries: 2,
            stuck_grace: Duration::from_secs(15),
            watchdog_interval: Duration::from_millis(100),
            entitlement_recheck: Duration::from_secs(600),
            ..Self::default()
        }
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Durations are read in milliseconds:
    /// - `HERALD_POLL_INTERVAL_MS`
    /// - `HERALD_FAST_PATH_READY_TIMEOUT_MS`
    /// - `HERALD_CONVERSATION_TIMEOUT_MS`
    /// - `HERALD_VALIDITY_TIMEOUT_MS`
    /// - `HERALD_POST_SEND_WINDOW_MS`
    /// - `HERALD_SENT_CONFIRMATION_TIMEOUT_MS`
    /// - `HERALD_SETTLE_DELAY_MS`
    /// - `HERALD_CHANNEL_CALL_TIMEOUT_MS`
    /// - `HERALD_STUCK_GRACE_MS`
    /// - `HERALD_ENTITLEMENT_RECHECK_MS`
    ///
    /// Others:
    /// - `HERALD_NAVIGATION_RETRIES`
    /// - `HERALD_KEEP_ALIVE_TEXT`
    /// - `HERALD_ATTACHMENT_FALLBACK` (`fail_closed` | `text_only`)
    /// - `HERALD_PROGRESS_CAPACITY`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            poll_interval: env_millis("HERALD_POLL_INTERVAL_MS", defaults.poll_interval),
            fast_path_ready_timeout: env_millis(
                "HERALD_FAST_PATH_READY_TIMEOUT_MS",
                defaults.fast_path_ready_timeout,
            ),
            conversation_timeout: env_millis(
                "HERALD_CONVERSATION_TIMEOUT_MS",
                defaults.conversation_timeout,
            ),
            validity_timeout: env_millis("HERALD_VALIDITY_TIMEOUT_MS", defaults.validity_timeout),
            post_send_window: env_millis("HERALD_POST_SEND_WINDOW_MS", defaults.post_send_window),
            sent_confirmation_timeout: env_millis(
                "HERALD_SENT_CONFIRMATION_TIMEOUT_MS",
                defaults.sent_confirmation_timeout,
            ),
            settle_delay: env_millis("HERALD_SETTLE_DELAY_MS", defaults.settle_delay),
            channel_call_timeout: env_millis(
                "HERALD_CHANNEL_CALL_TIMEOUT_MS",
                defaults.channel_call_timeout,
            ),
            navigation_retries: std::env::var("HERALD_NAVIGATION_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.navigation_retries),
            stuck_grace: env_millis("HERALD_STUCK_GRACE_MS", defaults.stuck_grace),
            watchdog_interval: defaults.watchdog_interval,
            entitlement_recheck: env_millis(
                "HERALD_ENTITLEMENT_RECHECK_MS",
                defaults.entitlement_recheck,
            ),
            safety_ping_every: defaults.safety_ping_every,
            keep_alive_text: std::env::var("HERALD_KEEP_ALIVE_TEXT")
                .unwrap_or(defaults.keep_alive_text),
            attachment_fallback: match std::env::var("HERALD_ATTACHMENT_FALLBACK")
                .map(|s| s.to_lowercase())
                .as_deref()
            {
                Ok("text_only") => AttachmentFallback::TextOnly,
                _ => defaults.attachment_fallback,
            },
            progress_capacity: std::env::var("HERALD_PROGRESS_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.progress_capacity),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - poll_interval is positive and at most one second
    /// - all timeouts are positive
    /// - stuck_grace spans at least one watchdog interval
    /// - safety ping range is ordered and non-zero
    /// - progress capacity is positive
    pub fn validate(&self) -> HeraldResult<()> {
        if self.poll_interval.is_zero() || self.poll_interval > Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: format!("{:?}", self.poll_interval),
                reason: "poll_interval must be between 1ms and 1s".to_string(),
            }
            .into());
        }

        for (field, value) in [
            ("fast_path_ready_timeout", self.fast_path_ready_timeout),
            ("conversation_timeout", self.conversation_timeout),
            ("validity_timeout", self.validity_timeout),
            ("post_send_window", self.post_send_window),
            ("sent_confirmation_timeout", self.sent_confirmation_timeout),
            ("channel_call_timeout", self.channel_call_timeout),
            ("stuck_grace", self.stuck_grace),
            ("watchdog_interval", self.watchdog_interval),
            ("entitlement_recheck", self.entitlement_recheck),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{} must be positive", field),
                }
                .into());
            }
        }

        if self.stuck_grace < self.watchdog_interval {
            return Err(ConfigError::InvalidValue {
                field: "stuck_grace".to_string(),
                value: format!("{:?}", self.stuck_grace),
                reason: "stuck_grace must be at least one watchdog_interval".to_string(),
            }
            .into());
        }

        let (min, max) = self.safety_ping_every;
        if min == 0 || min > max {
            return Err(ConfigError::InvalidRange {
                field: "safety_ping_every".to_string(),
                min,
                max,
            }
            .into());
        }

        if self.progress_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "progress_capacity".to_string(),
                value: "0".to_string(),
                reason: "progress_capacity must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Longest a single delivery attempt can take when every bounded wait
    /// and every channel call runs to its limit.
    ///
    /// Covers the fast path, every navigation try, manual emulation and the
    /// post-send check, plus one poll interval of slack per wait.
    pub fn attempt_budget(&self) -> Duration {
        let call = self.channel_call_timeout;
        let slack = self.poll_interval;

        // readiness polls, pre-send probe, attempt_deliver
        let fast_path = self.fast_path_ready_timeout
            + self.validity_timeout
            + call * 3
            + slack * 2;
        // open, state polls, validity probe, three attach techniques, fill,
        // click, sent probe
        let navigation_try = self.conversation_timeout
            + self.settle_delay
            + self.validity_timeout
            + self.sent_confirmation_timeout
            + call * 9
            + slack * 3;
        let navigation = navigation_try * (self.navigation_retries + 1);
        let manual = self.sent_confirmation_timeout + call * 2 + slack;
        let post_send = self.post_send_window + call + slack;

        fast_path + navigation + manual + post_send
    }
}

fn default_channel_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeraldError;

    #[test]
    fn test_default_and_development_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::development().validate().is_ok());
    }

    #[test]
    fn test_poll_interval_above_one_second_rejected() {
        let config = EngineConfig {
            poll_interval: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            HeraldError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "poll_interval"
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = EngineConfig {
            validity_timeout: Duration::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stuck_grace_shorter_than_watchdog_interval_rejected() {
        let config = EngineConfig {
            stuck_grace: Duration::from_millis(50),
            watchdog_interval: Duration::from_millis(100),
            ..EngineConfig::development()
        };
        assert!(matches!(
            config.validate(),
            Err(HeraldError::Config(ConfigError::InvalidValue { ref field, .. })) if field == "stuck_grace"
        ));
    }

    #[test]
    fn test_zero_channel_call_timeout_rejected() {
        let config = EngineConfig {
            channel_call_timeout: Duration::ZERO,
            ..EngineConfig::development()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_attempt_budget_covers_every_bounded_wait() {
        let config = EngineConfig::default();
        let budget = config.attempt_budget();
        let navigation_waits = (config.conversation_timeout
            + config.validity_timeout
            + config.sent_confirmation_timeout)
            * (config.navigation_retries + 1);
        assert!(budget > config.fast_path_ready_timeout + navigation_waits + config.post_send_window);
        assert!(budget > config.channel_call_timeout * 9 * (config.navigation_retries + 1));

        let fewer_retries = EngineConfig {
            navigation_retries: 0,
            ..EngineConfig::default()
        };
        assert!(fewer_retries.attempt_budget() < budget);
    }

    #[test]
    fn test_inverted_safety_ping_range_rejected() {
        let config = EngineConfig {
            safety_ping_every: (15, 10),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HeraldError::Config(ConfigError::InvalidRange { .. }))
        ));
    }

    #[test]
    fn test_pacing_validation() {
        assert!(PacingConfig::default().validate().is_ok());

        let inverted = PacingConfig {
            random_delay: Some(RandomRange::new(10, 5)),
            ..PacingConfig::default()
        };
        assert!(inverted.validate().is_err());

        let empty_batch = PacingConfig {
            batch: Some(BatchPacing {
                size: RandomRange::fixed(0),
                delay_minutes: RandomRange::fixed(1),
            }),
            ..PacingConfig::default()
        };
        assert!(empty_batch.validate().is_err());

        let loud = PacingConfig {
            human_pattern: true,
            human_intensity: 150,
            ..PacingConfig::default()
        };
        assert!(loud.validate().is_err());
    }

    #[test]
    fn test_pacing_deserializes_with_defaults() {
        let pacing: PacingConfig = serde_json::from_str(r#"{"turbo": true}"#).unwrap();
        assert!(pacing.turbo);
        assert_eq!(pacing.human_intensity, 50);
        assert!(pacing.batch.is_none());
    }
}
