//! In-process queue for tests and single-node deployments.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{CourierPersister, DEFAULT_CLAIM_TIMEOUT};
use crate::config::DispatchSettings;
use crate::error::{CourierError, CourierResult};
use crate::message::{Message, MessageStatus};

struct Entry {
    message: Message,
    claimed_at: Option<Instant>,
}

/// [`CourierPersister`] backed by a mutex-guarded vector in insertion order
pub struct InMemoryPersister {
    entries: Mutex<Vec<Entry>>,
    claim_timeout: Duration,
}

impl Default for InMemoryPersister {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPersister {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    /// Persister using the configured claim timeout
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self::new().with_claim_timeout(settings.claim_timeout())
    }

    pub fn with_claim_timeout(mut self, claim_timeout: Duration) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    /// Snapshot of every stored message in insertion order
    pub fn messages(&self) -> Vec<Message> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    fn claimable(&self, entry: &Entry, now: Instant) -> bool {
        entry.message.status == MessageStatus::Queued
            && entry
                .claimed_at
                .map_or(true, |at| now.duration_since(at) >= self.claim_timeout)
    }
}

#[async_trait]
impl CourierPersister for InMemoryPersister {
    async fn add_message(&self, message: &Message) -> CourierResult<()> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|entry| entry.message.id == message.id) {
            return Err(CourierError::Queue(format!(
                "message {} already exists",
                message.id
            )));
        }
        entries.push(Entry {
            message: message.clone(),
            claimed_at: None,
        });
        Ok(())
    }

    async fn next_messages(&self, limit: usize) -> CourierResult<Vec<Message>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut batch = Vec::new();

        for entry in entries.iter_mut() {
            if batch.len() >= limit {
                break;
            }
            if self.claimable(entry, now) {
                entry.claimed_at = Some(now);
                batch.push(entry.message.clone());
            }
        }

        debug!(count = batch.len(), "Claimed queued messages");
        Ok(batch)
    }

    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> CourierResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .ok_or(CourierError::MessageNotFound(id))?;

        let from = entry.message.status;
        if from.is_terminal() || !status.is_terminal() {
            return Err(CourierError::InvalidStatusTransition { id, from, to: status });
        }

        let now = Utc::now();
        entry.message.status = status;
        entry.message.updated_at = now;
        if status == MessageStatus::Sent {
            entry.message.sent_at = Some(now);
        }
        entry.claimed_at = None;
        Ok(())
    }

    async fn release_message(&self, id: Uuid, error: Option<&str>) -> CourierResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .ok_or(CourierError::MessageNotFound(id))?;

        if entry.message.status.is_terminal() {
            return Err(CourierError::InvalidStatusTransition {
                id,
                from: entry.message.status,
                to: MessageStatus::Queued,
            });
        }

        if let Some(error) = error {
            entry.message.send_count += 1;
            entry.message.last_error = Some(error.to_string());
        }
        entry.message.updated_at = Utc::now();
        entry.claimed_at = None;
        Ok(())
    }

    async fn fail_message(&self, id: Uuid, error: &str) -> CourierResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.message.id == id)
            .ok_or(CourierError::MessageNotFound(id))?;

        if entry.message.status.is_terminal() {
            return Err(CourierError::InvalidStatusTransition {
                id,
                from: entry.message.status,
                to: MessageStatus::Failed,
            });
        }

        entry.message.status = MessageStatus::Failed;
        entry.message.send_count += 1;
        entry.message.last_error = Some(error.to_string());
        entry.message.updated_at = Utc::now();
        entry.claimed_at = None;
        debug!(message_id = %id, "Message marked as failed");
        Ok(())
    }

    async fn latest_queued_message(&self) -> CourierResult<Option<Message>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .rev()
            .find(|entry| entry.message.status == MessageStatus::Queued)
            .map(|entry| entry.message.clone()))
    }

    async fn get_message(&self, id: Uuid) -> CourierResult<Message> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.message.id == id)
            .map(|entry| entry.message.clone())
            .ok_or(CourierError::MessageNotFound(id))
    }

    async fn queued_count(&self) -> CourierResult<i64> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.message.status == MessageStatus::Queued)
            .count() as i64)
    }
}
