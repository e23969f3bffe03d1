//! Error types for HERALD operations

use crate::{CampaignId, CampaignStatus};
use thiserror::Error;

/// Checkpoint store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Checkpoint not found for campaign {campaign_id}")]
    NotFound { campaign_id: CampaignId },

    #[error("Checkpoint write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Checkpoint read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Corrupt checkpoint for campaign {campaign_id}: {reason}")]
    Corrupt {
        campaign_id: CampaignId,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Contact list is empty")]
    EmptyContactList,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid range for {field}: min {min} exceeds max {max}")]
    InvalidRange { field: String, min: u32, max: u32 },
}

/// Errors surfaced by a delivery channel.
///
/// These never leave the dispatch loop: the strategy chain turns them into a
/// recorded outcome for the contact.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("UI element not found: {element}")]
    ElementNotFound { element: String },

    #[error("Send controls could not be located")]
    SendControlsMissing,

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Channel unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Attachment via {technique} failed: {reason}")]
    AttachmentFailed { technique: String, reason: String },

    #[error("Recipient rejected: {reason}")]
    Rejected { reason: String },
}

/// Campaign engine control errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Campaign {campaign_id} is already active")]
    AlreadyActive { campaign_id: CampaignId },

    #[error("No active campaign")]
    NoActiveCampaign,

    #[error("Cannot {action} a campaign in state {from}")]
    InvalidTransition {
        from: CampaignStatus,
        action: String,
    },

    #[error("Account {account} is not entitled to start campaigns")]
    NotEntitled { account: String },

    #[error("Entitlement gate unavailable: {reason}")]
    EntitlementUnavailable { reason: String },

    #[error("Dispatch loop fault: {reason}")]
    LoopFault { reason: String },
}

/// Master error type for all HERALD errors.
#[derive(Debug, Clone, Error)]
pub enum HeraldError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type alias for HERALD operations.
pub type HeraldResult<T> = Result<T, HeraldError>;
