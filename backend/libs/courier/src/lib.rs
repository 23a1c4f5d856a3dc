//! # Courier
//!
//! Durable outbound email and SMS delivery for identity flows (verification, recovery,
//! one-time login codes).
//!
//! Producers build a typed template model and hand it to [`Courier::queue_email`] or
//! [`Courier::queue_sms`]. The message is persisted as `queued` and the call returns its
//! id without waiting for delivery. A background worker started with [`Courier::work`]
//! repeatedly claims batches from the [`CourierPersister`], renders what was not rendered
//! at enqueue time, and hands each message to the [`ChannelSender`] registered for its
//! channel.
//!
//! ## Delivery semantics
//!
//! - Messages of one batch are delivered in queue (insertion) order.
//! - A claimed message is never handed to a second worker until it is settled,
//!   released, or its claim goes stale.
//! - Transient failures leave the message queued for the next pass; permanent failures
//!   mark it `failed`. Delivery is at-least-once until a terminal state is reached.
//! - A pass that fails as a whole (queue unavailable, or any message failing in
//!   fail-fast mode) is retried with exponential backoff; once the backoff budget is
//!   exhausted `work` returns the error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier::template::{VerificationValid, VerificationValidModel};
//! use courier::{build_http_client, Courier, CourierConfig, InMemoryPersister};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CourierConfig::from_env()?;
//!     let http = build_http_client(&config.http)?;
//!     let courier = Arc::new(Courier::new(
//!         &config,
//!         Arc::new(InMemoryPersister::from_settings(&config.dispatch)),
//!         http,
//!     )?);
//!
//!     let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!     let worker = tokio::spawn({
//!         let courier = courier.clone();
//!         async move { courier.work(shutdown_rx).await }
//!     });
//!
//!     courier
//!         .queue_email(&VerificationValid::new(VerificationValidModel {
//!             to: "foo@example.org".to_string(),
//!             verification_url: "https://example.org/verify?token=abc".to_string(),
//!         }))
//!         .await?;
//!
//!     shutdown_tx.send(true)?;
//!     worker.await??;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
mod courier;
mod error;
pub mod message;
pub mod metrics;
pub mod persister;
pub mod template;

pub use channel::{build_http_client, ChannelRegistry, ChannelSender, Envelope, SmsSender, SmtpSender};
pub use config::CourierConfig;
pub use courier::Courier;
pub use error::{CourierError, CourierResult};
pub use message::{Message, MessageChannel, MessageStatus};
pub use metrics::CourierMetrics;
pub use persister::{CourierPersister, InMemoryPersister, SqlxPersister};
pub use template::{EmailTemplate, SmsTemplate, TemplateRenderer, TemplateType};
