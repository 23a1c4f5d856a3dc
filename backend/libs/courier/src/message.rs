//! Queued outbound messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::template::TemplateType;

/// Delivery transport of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Email,
    Sms,
}

impl MessageChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageChannel::Email => "email",
            MessageChannel::Sms => "sms",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(MessageChannel::Email),
            "sms" => Some(MessageChannel::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for MessageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a message. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Sent => "sent",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(MessageStatus::Queued),
            "sent" => Some(MessageStatus::Sent),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MessageStatus::Queued)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of outbound communication as stored in the queue.
///
/// `body` (and `subject` for email) may be empty when rendering was deferred to
/// dispatch time; `template_type` and `template_data` are always sufficient to
/// render them again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier, assigned at enqueue time
    pub id: Uuid,

    pub channel: MessageChannel,

    pub status: MessageStatus,

    /// Email address or E.164 phone number
    pub recipient: String,

    /// Email subject; always empty for SMS
    pub subject: String,

    /// Rendered body (HTML for email)
    pub body: String,

    pub template_type: TemplateType,

    /// Template model serialized verbatim
    pub template_data: serde_json::Value,

    /// Number of failed delivery attempts
    pub send_count: i32,

    /// Last delivery error, kept for operators
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build a fresh `Queued` message with a new id.
    pub fn new(
        channel: MessageChannel,
        recipient: impl Into<String>,
        template_type: TemplateType,
        template_data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel,
            status: MessageStatus::Queued,
            recipient: recipient.into(),
            subject: String::new(),
            body: String::new(),
            template_type,
            template_data,
            send_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
        }
    }

    /// Whether the body still needs to be rendered before delivery
    pub fn needs_rendering(&self) -> bool {
        self.body.is_empty() || (self.channel == MessageChannel::Email && self.subject.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_and_status_round_trip_through_strings() {
        for channel in [MessageChannel::Email, MessageChannel::Sms] {
            assert_eq!(MessageChannel::parse(channel.as_str()), Some(channel));
        }
        for status in [MessageStatus::Queued, MessageStatus::Sent, MessageStatus::Failed] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("processing"), None);
    }

    #[test]
    fn test_new_message_is_queued_and_unrendered() {
        let message = Message::new(
            MessageChannel::Sms,
            "+15551234567",
            TemplateType::SmsLoginCode,
            serde_json::json!({ "to": "+15551234567", "code": "123456" }),
        );

        assert_eq!(message.status, MessageStatus::Queued);
        assert!(!message.status.is_terminal());
        assert!(message.needs_rendering());
        assert_eq!(message.send_count, 0);
    }
}
