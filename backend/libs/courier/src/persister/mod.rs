//! Durable message queue consumed by the courier.
//!
//! The persister is the only coordination point between producers and the dispatch
//! worker. Messages returned by [`CourierPersister::next_messages`] are *claimed*: no
//! other fetch sees them until they are marked sent/failed, released, or the claim goes
//! stale (older than the persister's claim timeout).

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::CourierResult;
use crate::message::{Message, MessageStatus};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryPersister;
pub use postgres::SqlxPersister;

/// Claims older than this are handed out again
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(300);

/// Storage for queued messages.
///
/// Implementations must make each operation atomic; a message added by
/// [`add_message`](Self::add_message) is only visible to fetches once the call returned.
#[async_trait]
pub trait CourierPersister: Send + Sync {
    /// Persist a new `Queued` message.
    async fn add_message(&self, message: &Message) -> CourierResult<()>;

    /// Claim up to `limit` queued messages, oldest first.
    ///
    /// An empty queue yields an empty vector.
    async fn next_messages(&self, limit: usize) -> CourierResult<Vec<Message>>;

    /// Move a queued message to `Sent` or `Failed` and drop its claim.
    ///
    /// # Errors
    ///
    /// `MessageNotFound` for unknown ids, `InvalidStatusTransition` when the message is
    /// already terminal or `status` is `Queued`.
    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> CourierResult<()>;

    /// Return a claimed message to the queue.
    ///
    /// With `Some(error)` the attempt is counted: `send_count` is incremented and
    /// `last_error` recorded. `None` releases a message that was never attempted.
    async fn release_message(&self, id: Uuid, error: Option<&str>) -> CourierResult<()>;

    /// Count a final failed attempt and mark the message `Failed` in one step.
    ///
    /// The message never becomes claimable again, not even briefly.
    ///
    /// # Errors
    ///
    /// `MessageNotFound` for unknown ids, `InvalidStatusTransition` when the message is
    /// already terminal.
    async fn fail_message(&self, id: Uuid, error: &str) -> CourierResult<()>;

    /// Most recently added message that is still queued
    async fn latest_queued_message(&self) -> CourierResult<Option<Message>>;

    async fn get_message(&self, id: Uuid) -> CourierResult<Message>;

    /// Number of queued messages, claimed or not
    async fn queued_count(&self) -> CourierResult<i64>;
}
