//! The delivery channel: everything the engine needs from the messaging
//! application, expressed as async primitives.

use async_trait::async_trait;
use herald_core::{Attachment, DeliveryError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// REQUEST AND UI STATE
// ============================================================================

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRequest {
    /// Normalized identifier
    pub identifier: String,
    /// Rendered message body
    pub message: String,
    pub attachment: Option<Attachment>,
}

impl DeliveryRequest {
    pub fn new(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Option<Attachment>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Same request without its attachment.
    pub fn text_only(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            message: self.message.clone(),
            attachment: None,
        }
    }
}

/// What an opened conversation currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Still loading
    Loading,
    /// Composer available
    Ready,
    /// The application flagged the recipient as invalid or blocked
    Invalid,
}

/// Ways of getting an attachment into the composer, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachTechnique {
    FileInput,
    Clipboard,
    DragAndDrop,
}

impl AttachTechnique {
    pub const ALL: [AttachTechnique; 3] = [
        AttachTechnique::FileInput,
        AttachTechnique::Clipboard,
        AttachTechnique::DragAndDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileInput => "file_input",
            Self::Clipboard => "clipboard",
            Self::DragAndDrop => "drag_and_drop",
        }
    }
}

impl fmt::Display for AttachTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHANNEL TRAIT
// ============================================================================

/// Access to the messaging application.
///
/// Implementations must be thread-safe. Every method returns promptly or
/// within the timeout it is given; callers slice long waits into short
/// probes so they can react to abort in between.
///
/// # Example
/// ```ignore
/// struct BrowserChannel { /* ... */ }
///
/// #[async_trait]
/// impl DeliveryChannel for BrowserChannel {
///     fn name(&self) -> &str { "browser" }
///     async fn fast_path_ready(&self) -> bool { /* ... */ }
///     // ...
/// }
/// ```
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the privileged integration point is usable right now.
    async fn fast_path_ready(&self) -> bool;

    /// Deliver through the privileged integration point.
    ///
    /// # Returns
    /// * `Ok(())` - The application accepted the message
    /// * `Err(DeliveryError::Rejected)` - The recipient is invalid
    /// * `Err(_)` - The fast path failed; other strategies may still work
    async fn attempt_deliver(&self, request: &DeliveryRequest) -> Result<(), DeliveryError>;

    /// Watch for the invalid/blocked-recipient indicator for up to `timeout`.
    ///
    /// # Returns
    /// * `Ok(true)` - The indicator was seen
    /// * `Ok(false)` - It did not appear within `timeout`
    async fn probe_validity(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> Result<bool, DeliveryError>;

    /// Watch for the sent indicator of the last message for up to `timeout`.
    async fn probe_sent(&self, timeout: Duration) -> Result<bool, DeliveryError>;

    /// Navigate to the conversation with `identifier`.
    async fn open_conversation(&self, identifier: &str) -> Result<(), DeliveryError>;

    async fn conversation_state(&self, identifier: &str) -> ConversationState;

    /// Inject an attachment into the open composer.
    async fn attach(
        &self,
        attachment: &Attachment,
        technique: AttachTechnique,
    ) -> Result<(), DeliveryError>;

    /// Type the message body into the open composer.
    async fn fill_message(&self, text: &str) -> Result<(), DeliveryError>;

    /// Press the send control.
    ///
    /// Returns `Err(DeliveryError::SendControlsMissing)` when the control
    /// cannot be located.
    async fn click_send(&self) -> Result<(), DeliveryError>;

    /// Send through emulated low-level input.
    async fn emulate_send(&self) -> Result<(), DeliveryError>;

    /// Send a low-risk keep-alive message to the account itself.
    async fn send_keep_alive(&self, text: &str) -> Result<(), DeliveryError>;
}
