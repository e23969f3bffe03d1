//! Dedup ledger: which identifiers a campaign has attempted, and how each ended.
//!
//! Every identifier gets exactly one outcome. The ledger is serialized as the
//! ordered list of entries and rebuilt from that list alone, so a resumed
//! campaign never depends on in-memory state surviving a restart.

use crate::{ContactOutcome, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub outcome: ContactOutcome,
    pub recorded_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl LedgerCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Per-campaign record of attempted identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<LedgerEntry>", into = "Vec<LedgerEntry>")]
pub struct DedupLedger {
    entries: Vec<LedgerEntry>,
    index: HashMap<String, usize>,
    counts: LedgerCounts,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any outcome has been recorded for `identifier`.
    pub fn is_attempted(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Record the outcome for `identifier`.
    ///
    /// Returns `false` (and changes nothing) if the identifier already has an
    /// outcome.
    pub fn record(
        &mut self,
        identifier: &str,
        outcome: ContactOutcome,
        reason: Option<String>,
    ) -> bool {
        if self.index.contains_key(identifier) {
            return false;
        }
        self.index.insert(identifier.to_string(), self.entries.len());
        self.entries.push(LedgerEntry {
            identifier: identifier.to_string(),
            outcome,
            recorded_at: Utc::now(),
            reason,
        });
        bump(&mut self.counts, outcome);
        true
    }

    pub fn outcome_of(&self, identifier: &str) -> Option<ContactOutcome> {
        self.index
            .get(identifier)
            .map(|&position| self.entries[position].outcome)
    }

    pub fn entry(&self, identifier: &str) -> Option<&LedgerEntry> {
        self.index.get(identifier).map(|&position| &self.entries[position])
    }

    pub fn counts(&self) -> LedgerCounts {
        self.counts
    }

    /// Number of attempted identifiers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were recorded.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// All attempted identifiers, regardless of outcome.
    pub fn attempted(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.identifier.clone()).collect()
    }

    /// Identifiers that ended with `outcome`, in record order.
    pub fn identifiers(&self, outcome: ContactOutcome) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.outcome == outcome)
            .map(|e| e.identifier.clone())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<String> {
        self.identifiers(ContactOutcome::Succeeded)
    }

    pub fn failed(&self) -> Vec<String> {
        self.identifiers(ContactOutcome::Failed)
    }

    pub fn skipped(&self) -> Vec<String> {
        self.identifiers(ContactOutcome::Skipped)
    }

    /// True when the three outcome sets exactly cover `total` identifiers.
    pub fn is_partition_of(&self, total: usize) -> bool {
        self.counts.total() == total && self.index.len() == total
    }
}

fn bump(counts: &mut LedgerCounts, outcome: ContactOutcome) {
    match outcome {
        ContactOutcome::Succeeded => counts.succeeded += 1,
        ContactOutcome::Failed => counts.failed += 1,
        ContactOutcome::Skipped => counts.skipped += 1,
    }
}

impl From<Vec<LedgerEntry>> for DedupLedger {
    fn from(entries: Vec<LedgerEntry>) -> Self {
        let mut ledger = DedupLedger::new();
        for entry in entries {
            // A torn checkpoint may repeat an identifier; first entry wins.
            if ledger.index.contains_key(&entry.identifier) {
                continue;
            }
            ledger
                .index
                .insert(entry.identifier.clone(), ledger.entries.len());
            bump(&mut ledger.counts, entry.outcome);
            ledger.entries.push(entry);
        }
        ledger
    }
}

impl From<DedupLedger> for Vec<LedgerEntry> {
    fn from(ledger: DedupLedger) -> Self {
        ledger.entries
    }
}

impl PartialEq for DedupLedger {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
