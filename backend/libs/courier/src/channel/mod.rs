//! Delivery channels.
//!
//! Each transport implements [`ChannelSender`]; the courier picks the sender for a message
//! from a [`ChannelRegistry`] keyed on [`MessageChannel`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CourierError, CourierResult};
use crate::message::MessageChannel;

pub mod http;
pub mod sms;
pub mod smtp;

pub use http::build_http_client;
pub use sms::SmsSender;
pub use smtp::SmtpSender;

/// Fully rendered message handed to a sender
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: Uuid,
    pub channel: MessageChannel,
    pub recipient: String,
    /// Empty for SMS
    pub subject: String,
    /// HTML for email, text for SMS
    pub body: String,
    /// Plain-text alternative; email is sent multipart when present
    pub body_plaintext: Option<String>,
    pub use_standby_sender: bool,
}

/// Delivers envelopes over one transport.
///
/// Implementations report failures as [`CourierError::TransientDelivery`] when a later
/// attempt may succeed and [`CourierError::PermanentDelivery`] otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> MessageChannel;

    async fn send(&self, envelope: &Envelope) -> CourierResult<()>;
}

/// Senders keyed by channel
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    senders: HashMap<MessageChannel, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sender under its own channel, replacing any previous one
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel(), sender);
    }

    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn get(&self, channel: MessageChannel) -> CourierResult<&Arc<dyn ChannelSender>> {
        self.senders
            .get(&channel)
            .ok_or(CourierError::SenderNotRegistered(channel))
    }

    pub fn contains(&self, channel: MessageChannel) -> bool {
        self.senders.contains_key(&channel)
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.senders.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Recipient as it may appear in logs
pub(crate) fn masked_recipient(channel: MessageChannel, recipient: &str) -> String {
    match channel {
        MessageChannel::Email => recipient.to_string(),
        MessageChannel::Sms => mask_phone(recipient),
    }
}

fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let visible: String = digits[digits.len() - 4..].iter().collect();
    format!("****{}", visible)
}
