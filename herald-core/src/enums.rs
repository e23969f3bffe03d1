//! Enum types for campaign lifecycle and delivery bookkeeping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an enum from its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ============================================================================
// CAMPAIGN STATUS
// ============================================================================

/// Lifecycle status of a campaign.
///
/// ```text
/// idle ──▶ running ⇄ paused
///             │  ▲
///             ▼  │
///        batch_waiting
///             │
///             ▼
///   completed | failed | aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Idle,
    Running,
    Paused,
    BatchWaiting,
    Completed,
    Failed,
    Aborted,
}

impl CampaignStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// The dispatch loop may make progress in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::BatchWaiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::BatchWaiting => "batch_waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "batch_waiting" | "batchwaiting" => Ok(Self::BatchWaiting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "aborted" => Ok(Self::Aborted),
            _ => Err(ParseEnumError {
                kind: "campaign status",
                value: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// OUTCOMES AND BATCHES
// ============================================================================

/// Final outcome of one contact within a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl ContactOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ContactOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a batch plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Running,
    Waiting,
    Completed,
}

/// What a pending wait is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    /// Per-message pacing delay
    Message,
    /// Inter-batch delay
    Batch,
}

// ============================================================================
// ATTACHMENTS
// ============================================================================

/// Payload class of an attachment, used for turbo pacing defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Document,
    Other,
}

impl AttachmentKind {
    /// Classify from a MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("application/") || mime.starts_with("text/") {
            Self::Document
        } else {
            Self::Other
        }
    }
}

/// What to do when every attachment-injection technique fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentFallback {
    /// Record the contact as failed. Nothing is sent.
    #[default]
    FailClosed,
    /// Send the text alone and mark the delivery as degraded.
    TextOnly,
}

// ============================================================================
// PROGRESS
// ============================================================================

/// Discriminator for progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Started,
    Sending,
    Delivered,
    Failed,
    Skipped,
    Waiting,
    BatchWaiting,
    Paused,
    Resumed,
    SafetyPing,
    Completed,
    Aborted,
    CampaignFailed,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Sending => "sending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Waiting => "waiting",
            Self::BatchWaiting => "batch_waiting",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::SafetyPing => "safety_ping",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::CampaignFailed => "campaign_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            CampaignStatus::Idle,
            CampaignStatus::Running,
            CampaignStatus::Paused,
            CampaignStatus::BatchWaiting,
            CampaignStatus::Completed,
            CampaignStatus::Failed,
            CampaignStatus::Aborted,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>(), Ok(status));
        }
        assert!("sleeping".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_active() {
        assert!(CampaignStatus::Aborted.is_terminal());
        assert!(!CampaignStatus::Paused.is_terminal());
        assert!(CampaignStatus::BatchWaiting.is_active());
        assert!(!CampaignStatus::Paused.is_active());
    }

    #[test]
    fn test_attachment_kind_from_mime() {
        assert_eq!(AttachmentKind::from_mime("image/JPEG"), AttachmentKind::Image);
        assert_eq!(AttachmentKind::from_mime("application/pdf"), AttachmentKind::Document);
        assert_eq!(AttachmentKind::from_mime("audio/ogg"), AttachmentKind::Other);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&CampaignStatus::BatchWaiting).unwrap();
        assert_eq!(json, "\"batch_waiting\"");
    }
}
