//! HERALD Engine - Resumable Campaign Dispatch
//!
//! [`CampaignEngine`] walks a campaign's contact list one contact at a time:
//! it renders the message, hands it to the delivery strategy chain, records
//! the outcome in the dedup ledger, applies pacing and checkpoints the
//! record after every step.
//!
//! Guarantees:
//!
//! - at most one dispatch loop per engine
//! - no identifier is attempted twice, across pauses, resumes and restarts
//! - pause and abort are honored within one poll interval, including during
//!   inter-message and inter-batch waits
//! - after a restart, [`CampaignEngine::resume_from_checkpoint`] continues at
//!   the saved position, pending waits included
//!
//! ```no_run
//! use herald_core::{CampaignRequest, Contact, PacingConfig};
//! use herald_delivery::DryRunChannel;
//! use herald_engine::CampaignEngine;
//! use herald_storage::InMemoryCheckpointStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> herald_core::HeraldResult<()> {
//! let engine = CampaignEngine::builder(
//!     Arc::new(DryRunChannel::new()),
//!     Arc::new(InMemoryCheckpointStore::new()),
//! )
//! .build()?;
//!
//! let request = CampaignRequest::new(vec![Contact::new("+1 555 000 0001")], "Hi {{name}}")
//!     .with_pacing(PacingConfig::immediate());
//! engine.start(request).await?;
//! engine.join().await;
//! # Ok(())
//! # }
//! ```

mod dispatch;
pub mod engine;
pub mod entitlement;
mod reconciler;
pub mod registry;
pub mod telemetry;
pub mod watchdog;

pub use engine::{CampaignEngine, EngineBuilder};
pub use entitlement::{AllowAll, EntitlementGate, DEFAULT_ACCOUNT};
pub use registry::EngineRegistry;
pub use telemetry::init_tracing;
pub use watchdog::FORCED_COMPLETION;
