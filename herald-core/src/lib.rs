//! HERALD Core - Campaign Data Types
//!
//! Pure data structures shared by every HERALD crate: campaigns, contacts,
//! the dedup ledger, configuration and the error taxonomy.
//! This crate performs no I/O.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod template;

pub use config::{
    BatchPacing, EngineConfig, PacingConfig, RandomRange, DEFAULT_PROGRESS_CAPACITY,
};
pub use entities::{
    Attachment, BatchCursor, BatchPlanEntry, Campaign, CampaignRequest, Contact, LastResults,
    PingCursor, ProgressEvent, OUTCOME_UNKNOWN, SKIP_INVALID_IDENTIFIER,
};
pub use enums::{
    AttachmentFallback, AttachmentKind, BatchStatus, CampaignStatus, ContactOutcome,
    ParseEnumError, ProgressKind, WaitKind,
};
pub use error::{
    ConfigError, DeliveryError, EngineError, HeraldError, HeraldResult, StorageError,
    ValidationError,
};
pub use identity::{
    eligible_identifier, ledger_key, normalize_identifier, CampaignId, MIN_IDENTIFIER_DIGITS,
};
pub use ledger::{DedupLedger, LedgerCounts, LedgerEntry};
pub use template::render_message;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
