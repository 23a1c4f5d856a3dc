//! Courier facade: enqueue, dispatch passes and the background worker loop.

use reqwest::Client;
use resilience::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channel::{masked_recipient, ChannelRegistry, Envelope, SmsSender, SmtpSender};
use crate::config::{CourierConfig, DispatchSettings};
use crate::error::{CourierError, CourierResult};
use crate::message::{Message, MessageChannel, MessageStatus};
use crate::metrics::CourierMetrics;
use crate::persister::CourierPersister;
use crate::template::{
    email_template_from, sms_template_from, EmailTemplate, SmsTemplate, TemplateRenderer,
};

/// Queues outbound messages and delivers them in the background.
///
/// Producers call [`queue_email`](Self::queue_email) / [`queue_sms`](Self::queue_sms); one
/// task per process runs [`work`](Self::work).
pub struct Courier {
    persister: Arc<dyn CourierPersister>,
    renderer: TemplateRenderer,
    senders: ChannelRegistry,
    dispatch: DispatchSettings,
    backoff: ExponentialBackoff,
    metrics: Option<CourierMetrics>,
}

enum PassOutcome {
    Completed,
    Stopped,
}

impl Courier {
    /// Build a courier with the SMTP sender and, when enabled, the SMS sender.
    ///
    /// `http_client` is used for SMS provider calls; see
    /// [`build_http_client`](crate::channel::build_http_client).
    pub fn new(
        config: &CourierConfig,
        persister: Arc<dyn CourierPersister>,
        http_client: Client,
    ) -> CourierResult<Self> {
        let mut senders = ChannelRegistry::new();
        senders.register(Arc::new(SmtpSender::new(&config.smtp)?));
        if config.sms.enabled {
            senders.register(Arc::new(SmsSender::new(
                &config.sms,
                &config.http,
                http_client,
            )?));
        }

        Ok(Self::with_senders(config, persister, senders))
    }

    /// Build a courier with an explicit set of senders
    pub fn with_senders(
        config: &CourierConfig,
        persister: Arc<dyn CourierPersister>,
        senders: ChannelRegistry,
    ) -> Self {
        Self {
            persister,
            renderer: TemplateRenderer::from_settings(&config.templates),
            senders,
            dispatch: config.dispatch.clone(),
            backoff: config.backoff.policy(),
            metrics: None,
        }
    }

    /// Abort a dispatch pass on the first per-message error
    pub fn fail_on_dispatch_error(mut self) -> Self {
        self.dispatch.fail_on_error = true;
        self
    }

    pub fn with_metrics(mut self, metrics: CourierMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn persister(&self) -> &Arc<dyn CourierPersister> {
        &self.persister
    }

    /// Persist an email; rendered now when `render_on_enqueue` is set.
    pub async fn queue_email(&self, template: &dyn EmailTemplate) -> CourierResult<Uuid> {
        let mut message = Message::new(
            MessageChannel::Email,
            template.email_recipient(),
            template.template_type(),
            template.template_data()?,
        );

        if self.dispatch.render_on_enqueue {
            message.subject = template.email_subject(&self.renderer)?;
            message.body = template.email_body(&self.renderer)?;
        }

        self.persister.add_message(&message).await?;

        info!(
            message_id = %message.id,
            template_type = %message.template_type,
            recipient = %message.recipient,
            "Email queued"
        );

        Ok(message.id)
    }

    /// Persist an SMS; rendered now when `render_on_enqueue` is set.
    pub async fn queue_sms(&self, template: &dyn SmsTemplate) -> CourierResult<Uuid> {
        let mut message = Message::new(
            MessageChannel::Sms,
            template.phone_number(),
            template.template_type(),
            template.template_data()?,
        );

        if self.dispatch.render_on_enqueue {
            message.body = template.sms_body(&self.renderer)?;
        }

        self.persister.add_message(&message).await?;

        info!(
            message_id = %message.id,
            template_type = %message.template_type,
            recipient = %masked_recipient(MessageChannel::Sms, &message.recipient),
            "SMS queued"
        );

        Ok(message.id)
    }

    /// Run one dispatch pass over the next batch of queued messages.
    ///
    /// Per-message failures end up in the message status unless fail-fast is on, in which
    /// case the failing message and the rest of the batch go back to the queue and the
    /// error is returned. Queue failures always end the pass with an error.
    pub async fn dispatch_queue(&self) -> CourierResult<()> {
        let messages = self
            .persister
            .next_messages(self.dispatch.batch_size)
            .await
            .map_err(|e| {
                self.record_pass_error("queue");
                e
            })?;

        if messages.is_empty() {
            debug!("No queued messages to dispatch");
        }

        for (index, message) in messages.iter().enumerate() {
            let settled = match self.deliver(message).await {
                Ok(()) => self.mark_sent(message).await,
                Err(e) if self.dispatch.fail_on_error => {
                    error!(
                        message_id = %message.id,
                        channel = %message.channel,
                        error = %e,
                        "Dispatch failed, aborting pass"
                    );
                    self.release_batch(&messages[index..], Some(&e)).await;
                    self.record_pass_error("delivery");
                    return Err(e);
                }
                Err(e) => self.record_failure(message, &e).await,
            };

            if let Err(e) = settled {
                error!(
                    message_id = %message.id,
                    error = %e,
                    "Failed to record delivery outcome, aborting pass"
                );
                self.release_batch(&messages[index + 1..], None).await;
                self.record_pass_error("queue");
                return Err(e);
            }
        }

        if let Some(metrics) = &self.metrics {
            if let Ok(queued) = self.persister.queued_count().await {
                metrics.queued.set(queued);
            }
        }

        Ok(())
    }

    /// Run the dispatch loop until `shutdown` flips to `true`.
    ///
    /// Returns `Ok(())` on shutdown, or the last pass error once the backoff budget is
    /// exhausted. A dropped shutdown sender never stops the worker.
    pub async fn work(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> CourierResult<()> {
        self.run(shutdown, None).await
    }

    /// Like [`work`](Self::work), but gives up with `DeadlineExceeded` after `deadline`.
    pub async fn work_until(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
        deadline: Duration,
    ) -> CourierResult<()> {
        self.run(shutdown, Some(deadline)).await
    }

    async fn run(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        deadline: Option<Duration>,
    ) -> CourierResult<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();

        let courier = Arc::clone(self);
        tokio::spawn(async move {
            let result = courier.watch_messages(stop_rx).await;
            let _ = done_tx.send(result);
        });

        let expired = async {
            match deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        let result = tokio::select! {
            done = done_rx => match done {
                Ok(result) => result,
                Err(_) => Err(CourierError::Other(anyhow::anyhow!(
                    "courier dispatch loop exited without reporting"
                ))),
            },
            _ = shutdown_signalled(&mut shutdown) => {
                info!("Courier received shutdown signal");
                Ok(())
            }
            _ = expired => {
                warn!("Courier worker deadline exceeded");
                Err(CourierError::DeadlineExceeded)
            }
        };

        let _ = stop_tx.send(true);
        result
    }

    async fn watch_messages(&self, mut stop: watch::Receiver<bool>) -> CourierResult<()> {
        info!(
            batch_size = self.dispatch.batch_size,
            poll_interval_ms = self.dispatch.poll_interval_ms,
            fail_on_error = self.dispatch.fail_on_error,
            "Courier dispatch loop starting"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            match self.dispatch_with_backoff(&mut stop).await {
                Ok(PassOutcome::Completed) => {}
                Ok(PassOutcome::Stopped) => break,
                Err(e) => {
                    error!(error = %e, "Courier dispatch loop giving up");
                    return Err(e);
                }
            }

            if sleep_or_stop(&mut stop, self.dispatch.poll_interval()).await {
                break;
            }
        }

        info!("Courier dispatch loop stopped");
        Ok(())
    }

    async fn dispatch_with_backoff(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> CourierResult<PassOutcome> {
        let mut backoff = self.backoff.start();

        loop {
            let error = match self.dispatch_queue().await {
                Ok(()) => return Ok(PassOutcome::Completed),
                Err(e) => e,
            };

            let delay = match backoff.next_delay() {
                Some(delay) => delay,
                None => return Err(error),
            };

            warn!(
                error = %error,
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Dispatch pass failed, backing off"
            );

            if sleep_or_stop(stop, delay).await {
                return Ok(PassOutcome::Stopped);
            }
        }
    }

    async fn deliver(&self, message: &Message) -> CourierResult<()> {
        let envelope = self.envelope(message)?;
        let sender = self.senders.get(message.channel)?;

        debug!(
            message_id = %message.id,
            channel = %message.channel,
            recipient = %masked_recipient(message.channel, &message.recipient),
            send_count = message.send_count,
            "Dispatching message"
        );

        sender.send(&envelope).await
    }

    /// Render whatever was deferred at enqueue time
    fn envelope(&self, message: &Message) -> CourierResult<Envelope> {
        match message.channel {
            MessageChannel::Email => {
                let template = email_template_from(message.template_type, &message.template_data)?;
                let (subject, body) = if message.needs_rendering() {
                    (
                        template.email_subject(&self.renderer)?,
                        template.email_body(&self.renderer)?,
                    )
                } else {
                    (message.subject.clone(), message.body.clone())
                };
                let body_plaintext = match template.email_body_plaintext(&self.renderer) {
                    Ok(text) => Some(text),
                    Err(CourierError::TemplateNotFound { .. }) => None,
                    Err(e) => return Err(e),
                };

                Ok(Envelope {
                    id: message.id,
                    channel: message.channel,
                    recipient: message.recipient.clone(),
                    subject,
                    body,
                    body_plaintext,
                    use_standby_sender: false,
                })
            }
            MessageChannel::Sms => {
                let template = sms_template_from(message.template_type, &message.template_data)?;
                let body = if message.needs_rendering() {
                    template.sms_body(&self.renderer)?
                } else {
                    message.body.clone()
                };

                Ok(Envelope {
                    id: message.id,
                    channel: message.channel,
                    recipient: message.recipient.clone(),
                    subject: String::new(),
                    body,
                    body_plaintext: None,
                    use_standby_sender: template.use_standby_sender(),
                })
            }
        }
    }

    async fn mark_sent(&self, message: &Message) -> CourierResult<()> {
        self.persister
            .set_message_status(message.id, MessageStatus::Sent)
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_sent(message.channel);
        }
        info!(
            message_id = %message.id,
            channel = %message.channel,
            template_type = %message.template_type,
            "Message delivered"
        );
        Ok(())
    }

    /// Transient failures go back to the queue until `max_attempts`; anything else is final
    async fn record_failure(&self, message: &Message, error: &CourierError) -> CourierResult<()> {
        let reason = error.to_string();
        let attempts = message.send_count.saturating_add(1);
        let exhausted = self
            .dispatch
            .max_attempts
            .map_or(false, |max| attempts >= max as i32);

        if error.is_transient() && !exhausted {
            self.persister
                .release_message(message.id, Some(&reason))
                .await?;
            if let Some(metrics) = &self.metrics {
                metrics.record_retried(message.channel);
            }
            warn!(
                message_id = %message.id,
                channel = %message.channel,
                attempts,
                error = %error,
                "Delivery failed, message stays queued"
            );
            return Ok(());
        }

        self.persister.fail_message(message.id, &reason).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_failed(message.channel);
        }
        error!(
            message_id = %message.id,
            channel = %message.channel,
            attempts,
            error = %error,
            "Delivery failed permanently, message marked as failed"
        );
        Ok(())
    }

    /// Put claimed messages back in the queue; `error` is counted against the first one
    async fn release_batch(&self, messages: &[Message], error: Option<&CourierError>) {
        let reason = error.map(ToString::to_string);
        for (index, message) in messages.iter().enumerate() {
            let attempt_error = reason.as_deref().filter(|_| index == 0);
            if let Err(e) = self.persister.release_message(message.id, attempt_error).await {
                warn!(
                    message_id = %message.id,
                    error = %e,
                    "Failed to release message after aborted pass"
                );
            }
        }
    }

    fn record_pass_error(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_pass_error(kind);
        }
    }
}

impl std::fmt::Debug for Courier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Courier")
            .field("renderer", &self.renderer)
            .field("senders", &self.senders)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

/// Resolves once the host asks for shutdown
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleep for `duration`; returns `true` if a stop was requested first
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop_requested(stop) => true,
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if stop.changed().await.is_err() || *stop.borrow() {
            return;
        }
    }
}
