//! Tracing subscriber setup for HERALD binaries.

use herald_core::{ConfigError, HeraldResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "herald_engine=info,herald_delivery=info,warn";

/// Install the global subscriber.
///
/// Honors `RUST_LOG`. Output is JSON lines when `json` is set, human-readable
/// otherwise.
pub fn init_tracing(json: bool) -> HeraldResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| {
        ConfigError::InvalidValue {
            field: "tracing".to_string(),
            value: if json { "json" } else { "text" }.to_string(),
            reason: format!("Failed to init subscriber: {}", e),
        }
        .into()
    })
}
