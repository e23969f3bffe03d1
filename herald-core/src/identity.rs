//! Campaign and contact identity.
//!
//! Contacts are keyed by the digits of their raw identifier. Identifiers with
//! fewer than [`MIN_IDENTIFIER_DIGITS`] digits are never dispatched.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minimum number of digits a normalized identifier needs to be dispatched.
pub const MIN_IDENTIFIER_DIGITS: usize = 8;

/// Opaque campaign identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(String);

impl CampaignId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-sortable campaign id.
    pub fn generate() -> Self {
        Self(format!("cmp-{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CampaignId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CampaignId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Strip everything except ASCII digits.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalized identifier if it is long enough to dispatch.
pub fn eligible_identifier(raw: &str) -> Option<String> {
    let digits = normalize_identifier(raw);
    if digits.len() >= MIN_IDENTIFIER_DIGITS {
        Some(digits)
    } else {
        None
    }
}

/// Key under which a contact is tracked in the dedup ledger.
///
/// Contacts without any digits get a positional key so that each of them
/// still occupies exactly one ledger slot.
pub fn ledger_key(raw: &str, position: usize) -> String {
    let digits = normalize_identifier(raw);
    if digits.is_empty() {
        format!("#{}", position)
    } else {
        digits
    }
}
