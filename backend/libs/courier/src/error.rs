//! Error types for the courier library.

use thiserror::Error;
use uuid::Uuid;

use crate::message::{MessageChannel, MessageStatus};

/// Result type alias for courier operations.
pub type CourierResult<T> = Result<T, CourierError>;

/// Errors that can occur while queueing, rendering or delivering messages.
#[derive(Error, Debug)]
pub enum CourierError {
    /// No override, no primary file and no fallback match for a template
    #[error("Template not found: {template} (looked for {path})")]
    TemplateNotFound { template: String, path: String },

    /// Template exists but could not be parsed or rendered against the model
    #[error("Template render error: {template}: {reason}")]
    TemplateRender { template: String, reason: String },

    /// Stored template data refers to a template kind this build does not know
    #[error("Unknown template type: {0}")]
    UnknownTemplateType(String),

    /// Delivery failed in a way that may succeed on a later pass
    #[error("Transient delivery error ({channel}): {reason}")]
    TransientDelivery { channel: MessageChannel, reason: String },

    /// Delivery was rejected; retrying will not help
    #[error("Permanent delivery error ({channel}): {reason}")]
    PermanentDelivery { channel: MessageChannel, reason: String },

    /// No sender registered for the message channel
    #[error("No sender registered for channel {0}")]
    SenderNotRegistered(MessageChannel),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Queue bookkeeping failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Message not found in the queue
    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    /// Status transitions are only allowed out of `Queued`
    #[error("Invalid status transition for message {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    },

    /// Invalid configuration detected while building the courier
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The deadline handed to the worker elapsed
    #[error("Courier worker deadline exceeded")]
    DeadlineExceeded,

    /// Generic error with context
    #[error("Courier error: {0}")]
    Other(#[from] anyhow::Error),
}

impl CourierError {
    pub fn transient(channel: MessageChannel, reason: impl Into<String>) -> Self {
        CourierError::TransientDelivery {
            channel,
            reason: reason.into(),
        }
    }

    pub fn permanent(channel: MessageChannel, reason: impl Into<String>) -> Self {
        CourierError::PermanentDelivery {
            channel,
            reason: reason.into(),
        }
    }

    /// Whether a per-message failure should leave the message queued for the next pass.
    ///
    /// Everything else that can go wrong with a single message (template bugs, rejected
    /// recipients, unknown template kinds, missing senders) is terminal for that message.
    pub fn is_transient(&self) -> bool {
        matches!(self, CourierError::TransientDelivery { .. })
    }
}
