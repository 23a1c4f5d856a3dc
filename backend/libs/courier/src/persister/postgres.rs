//! PostgreSQL queue.
//!
//! Claims are taken with `FOR UPDATE SKIP LOCKED` so several workers can poll the same
//! table without handing out a message twice. Schema: `migrations/*_courier_messages.sql`.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CourierPersister, DEFAULT_CLAIM_TIMEOUT};
use crate::config::DispatchSettings;
use crate::error::{CourierError, CourierResult};
use crate::message::{Message, MessageChannel, MessageStatus};
use crate::template::TemplateType;

const MESSAGE_COLUMNS: &str = r#"
    id,
    channel,
    status,
    recipient,
    subject,
    body,
    template_type,
    template_data,
    send_count,
    last_error,
    created_at,
    updated_at,
    sent_at,
    seq
"#;

/// [`CourierPersister`] on top of a `courier_messages` table
pub struct SqlxPersister {
    pool: PgPool,
    claim_timeout: Duration,
}

impl SqlxPersister {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
        }
    }

    /// Persister using the configured claim timeout
    pub fn from_settings(pool: PgPool, settings: &DispatchSettings) -> Self {
        Self::new(pool).with_claim_timeout(settings.claim_timeout())
    }

    pub fn with_claim_timeout(mut self, claim_timeout: Duration) -> Self {
        self.claim_timeout = claim_timeout;
        self
    }

    /// Apply the bundled migrations
    pub async fn migrate(&self) -> CourierResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run courier migrations")?;
        Ok(())
    }

    async fn current_status(&self, id: Uuid) -> CourierResult<MessageStatus> {
        let row = sqlx::query("SELECT status FROM courier_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up message status")?
            .ok_or(CourierError::MessageNotFound(id))?;

        let status: String = row.try_get("status").context("Failed to read status")?;
        MessageStatus::parse(&status)
            .ok_or_else(|| CourierError::Queue(format!("unknown message status '{}'", status)))
    }
}

fn message_from_row(row: &PgRow) -> CourierResult<(Message, i64)> {
    let channel: String = row.try_get("channel").context("Failed to read channel")?;
    let status: String = row.try_get("status").context("Failed to read status")?;
    let template_type: String = row
        .try_get("template_type")
        .context("Failed to read template_type")?;

    let message = Message {
        id: row.try_get("id").context("Failed to read id")?,
        channel: MessageChannel::parse(&channel)
            .ok_or_else(|| CourierError::Queue(format!("unknown channel '{}'", channel)))?,
        status: MessageStatus::parse(&status)
            .ok_or_else(|| CourierError::Queue(format!("unknown message status '{}'", status)))?,
        recipient: row.try_get("recipient").context("Failed to read recipient")?,
        subject: row.try_get("subject").context("Failed to read subject")?,
        body: row.try_get("body").context("Failed to read body")?,
        template_type: TemplateType::parse(&template_type)
            .ok_or(CourierError::UnknownTemplateType(template_type))?,
        template_data: row
            .try_get("template_data")
            .context("Failed to read template_data")?,
        send_count: row.try_get("send_count").context("Failed to read send_count")?,
        last_error: row.try_get("last_error").context("Failed to read last_error")?,
        created_at: row.try_get("created_at").context("Failed to read created_at")?,
        updated_at: row.try_get("updated_at").context("Failed to read updated_at")?,
        sent_at: row.try_get("sent_at").context("Failed to read sent_at")?,
    };
    let seq: i64 = row.try_get("seq").context("Failed to read seq")?;

    Ok((message, seq))
}

/// Split claimed rows into deliverable messages in queue order and rows that can never be
/// delivered by this build (unknown channel or template type)
fn partition_claimed(
    parsed: impl IntoIterator<Item = (Uuid, CourierResult<(Message, i64)>)>,
) -> (Vec<Message>, Vec<(Uuid, CourierError)>) {
    let mut claimed = Vec::new();
    let mut unreadable = Vec::new();
    for (id, result) in parsed {
        match result {
            Ok(found) => claimed.push(found),
            Err(e) => unreadable.push((id, e)),
        }
    }

    // RETURNING does not keep the CTE order
    claimed.sort_by(|(a, a_seq), (b, b_seq)| {
        a.created_at.cmp(&b.created_at).then(a_seq.cmp(b_seq))
    });

    (
        claimed.into_iter().map(|(message, _)| message).collect(),
        unreadable,
    )
}

#[async_trait]
impl CourierPersister for SqlxPersister {
    async fn add_message(&self, message: &Message) -> CourierResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courier_messages (
                id,
                channel,
                status,
                recipient,
                subject,
                body,
                template_type,
                template_data,
                send_count,
                last_error,
                created_at,
                updated_at,
                sent_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id)
        .bind(message.channel.as_str())
        .bind(message.status.as_str())
        .bind(&message.recipient)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(message.template_type.as_str())
        .bind(&message.template_data)
        .bind(message.send_count)
        .bind(&message.last_error)
        .bind(message.created_at)
        .bind(message.updated_at)
        .bind(message.sent_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert courier message")?;

        debug!(
            message_id = %message.id,
            channel = %message.channel,
            template_type = %message.template_type,
            "Message inserted into courier queue"
        );

        Ok(())
    }

    async fn next_messages(&self, limit: usize) -> CourierResult<Vec<Message>> {
        let query = format!(
            r#"
            WITH next AS (
                SELECT id
                FROM courier_messages
                WHERE status = 'queued'
                  AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $2))
                ORDER BY created_at ASC, seq ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE courier_messages m
            SET claimed_at = NOW()
            FROM next
            WHERE m.id = next.id
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
                .split(',')
                .map(|column| format!("m.{}", column.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .bind(self.claim_timeout.as_secs_f64())
            .fetch_all(&self.pool)
            .await
            .context("Failed to claim queued messages")?;

        let parsed = rows
            .iter()
            .map(|row| {
                let id: Uuid = row.try_get("id").context("Failed to read id")?;
                Ok::<_, CourierError>((id, message_from_row(row)))
            })
            .collect::<CourierResult<Vec<_>>>()?;
        let (claimed, unreadable) = partition_claimed(parsed);

        for (id, error) in unreadable {
            warn!(
                message_id = %id,
                error = %error,
                "Claimed message cannot be delivered, marking as failed"
            );
            if let Err(e) = self.fail_message(id, &error.to_string()).await {
                warn!(message_id = %id, error = %e, "Failed to mark message as failed");
            }
        }

        debug!(count = claimed.len(), "Claimed queued messages");

        Ok(claimed)
    }

    async fn set_message_status(&self, id: Uuid, status: MessageStatus) -> CourierResult<()> {
        if !status.is_terminal() {
            let from = self.current_status(id).await?;
            return Err(CourierError::InvalidStatusTransition { id, from, to: status });
        }

        let result = sqlx::query(
            r#"
            UPDATE courier_messages
            SET status = $2,
                claimed_at = NULL,
                updated_at = NOW(),
                sent_at = CASE WHEN $2 = 'sent' THEN NOW() ELSE sent_at END
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update message status")?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            warn!(message_id = %id, from = %from, to = %status, "Rejected status transition");
            return Err(CourierError::InvalidStatusTransition { id, from, to: status });
        }

        debug!(message_id = %id, status = %status, "Message status updated");

        Ok(())
    }

    async fn release_message(&self, id: Uuid, error: Option<&str>) -> CourierResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE courier_messages
            SET claimed_at = NULL,
                updated_at = NOW(),
                send_count = send_count + CASE WHEN $2::TEXT IS NULL THEN 0 ELSE 1 END,
                last_error = COALESCE($2, last_error)
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to release message")?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(CourierError::InvalidStatusTransition {
                id,
                from,
                to: MessageStatus::Queued,
            });
        }

        Ok(())
    }

    async fn fail_message(&self, id: Uuid, error: &str) -> CourierResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE courier_messages
            SET status = 'failed',
                claimed_at = NULL,
                updated_at = NOW(),
                send_count = send_count + 1,
                last_error = $2
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark message as failed")?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(CourierError::InvalidStatusTransition {
                id,
                from,
                to: MessageStatus::Failed,
            });
        }

        debug!(message_id = %id, "Message marked as failed");

        Ok(())
    }

    async fn latest_queued_message(&self) -> CourierResult<Option<Message>> {
        let query = format!(
            r#"
            SELECT {}
            FROM courier_messages
            WHERE status = 'queued'
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
            MESSAGE_COLUMNS
        );

        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch latest queued message")?;

        row.as_ref()
            .map(message_from_row)
            .transpose()
            .map(|found| found.map(|(message, _)| message))
    }

    async fn get_message(&self, id: Uuid) -> CourierResult<Message> {
        let query = format!("SELECT {} FROM courier_messages WHERE id = $1", MESSAGE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch message")?
            .ok_or(CourierError::MessageNotFound(id))?;

        message_from_row(&row).map(|(message, _)| message)
    }

    async fn queued_count(&self) -> CourierResult<i64> {
        let row = sqlx::query("SELECT COUNT(*)::BIGINT AS queued FROM courier_messages WHERE status = 'queued'")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count queued messages")?;

        let queued: i64 = row.try_get("queued").context("Failed to read queued count")?;
        Ok(queued)
    }
}
