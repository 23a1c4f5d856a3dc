//! SMS delivery through an HTTP provider.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use resilience::{with_retry_if, RetryConfig};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use super::http::validate_endpoint;
use super::{masked_recipient, ChannelSender, Envelope};
use crate::config::{HttpClientSettings, SmsBodyEncoding, SmsRequestSettings, SmsSettings};
use crate::error::{CourierError, CourierResult};
use crate::message::MessageChannel;

/// Provider response bodies are cut to this length in errors
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: Url,
    method: Method,
    request: SmsRequestSettings,
}

impl Endpoint {
    fn new(request: &SmsRequestSettings, http: &HttpClientSettings) -> CourierResult<Self> {
        let url = validate_endpoint(&request.url, http)?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| {
                CourierError::Config(format!("Invalid SMS request method '{}': {}", request.method, e))
            })?;
        Ok(Self {
            url,
            method,
            request: request.clone(),
        })
    }
}

/// Posts rendered SMS bodies to the configured provider
#[derive(Debug, Clone)]
pub struct SmsSender {
    client: Client,
    from: String,
    primary: Endpoint,
    standby: Option<Endpoint>,
    retry: RetryConfig,
}

impl SmsSender {
    pub fn new(settings: &SmsSettings, http: &HttpClientSettings, client: Client) -> CourierResult<Self> {
        let primary = Endpoint::new(&settings.request, http)?;
        let standby = settings
            .standby_request
            .as_ref()
            .map(|request| Endpoint::new(request, http))
            .transpose()?;

        Ok(Self {
            client,
            from: settings.from.clone(),
            primary,
            standby,
            retry: http.retry_config(),
        })
    }

    fn endpoint(&self, use_standby_sender: bool) -> &Endpoint {
        match (&self.standby, use_standby_sender) {
            (Some(standby), true) => standby,
            _ => &self.primary,
        }
    }

    async fn deliver(&self, endpoint: &Endpoint, envelope: &Envelope) -> CourierResult<()> {
        let payload = SmsPayload {
            to: &envelope.recipient,
            from: &self.from,
            body: &envelope.body,
        };

        let mut request = self
            .client
            .request(endpoint.method.clone(), endpoint.url.clone());
        for (name, value) in &endpoint.request.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &endpoint.request.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request = match endpoint.request.body_encoding {
            SmsBodyEncoding::Json => request.json(&payload),
            SmsBodyEncoding::Form => request.form(&payload),
        };

        let response = request.send().await.map_err(|e| {
            CourierError::transient(MessageChannel::Sms, format!("provider request failed: {}", e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        let reason = format!("provider responded {}: {}", status, text.trim());

        if is_retryable_status(status) {
            Err(CourierError::transient(MessageChannel::Sms, reason))
        } else {
            Err(CourierError::permanent(MessageChannel::Sms, reason))
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> MessageChannel {
        MessageChannel::Sms
    }

    async fn send(&self, envelope: &Envelope) -> CourierResult<()> {
        let endpoint = self.endpoint(envelope.use_standby_sender);
        debug!(
            message_id = %envelope.id,
            recipient = %masked_recipient(MessageChannel::Sms, &envelope.recipient),
            standby = envelope.use_standby_sender && self.standby.is_some(),
            "Sending SMS"
        );

        with_retry_if(self.retry.clone(), CourierError::is_transient, || {
            self.deliver(endpoint, envelope)
        })
        .await
        .map_err(|e| e.into_inner())?;

        info!(
            message_id = %envelope.id,
            recipient = %masked_recipient(MessageChannel::Sms, &envelope.recipient),
            "SMS accepted by provider"
        );
        Ok(())
    }
}
