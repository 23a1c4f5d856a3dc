use prometheus::{IntCounterVec, IntGauge, Opts};
use tracing::warn;

use crate::message::MessageChannel;

/// Prometheus metrics for the dispatch worker
#[derive(Clone)]
pub struct CourierMetrics {
    pub queued: IntGauge,
    pub sent: IntCounterVec,
    pub failed: IntCounterVec,
    pub retried: IntCounterVec,
    pub pass_errors: IntCounterVec,
}

impl CourierMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let queued = IntGauge::with_opts(
            Opts::new(
                "courier_messages_queued",
                "Number of messages waiting in the courier queue",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for courier_messages_queued");

        let sent = IntCounterVec::new(
            Opts::new(
                "courier_messages_sent_total",
                "Total number of messages delivered to a provider",
            )
            .const_label("service", service.to_string()),
            &["channel"],
        )
        .expect("valid metric opts for courier_messages_sent_total");

        let failed = IntCounterVec::new(
            Opts::new(
                "courier_messages_failed_total",
                "Total number of messages marked as permanently failed",
            )
            .const_label("service", service.to_string()),
            &["channel"],
        )
        .expect("valid metric opts for courier_messages_failed_total");

        let retried = IntCounterVec::new(
            Opts::new(
                "courier_messages_retried_total",
                "Total number of transient delivery failures left queued for retry",
            )
            .const_label("service", service.to_string()),
            &["channel"],
        )
        .expect("valid metric opts for courier_messages_retried_total");

        let pass_errors = IntCounterVec::new(
            Opts::new(
                "courier_dispatch_pass_errors_total",
                "Total number of dispatch passes that ended in an error",
            )
            .const_label("service", service.to_string()),
            &["kind"],
        )
        .expect("valid metric opts for courier_dispatch_pass_errors_total");

        for metric in [
            Box::new(queued.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(sent.clone()),
            Box::new(failed.clone()),
            Box::new(retried.clone()),
            Box::new(pass_errors.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register courier metric: {}", e);
            }
        }

        Self {
            queued,
            sent,
            failed,
            retried,
            pass_errors,
        }
    }

    pub(crate) fn record_sent(&self, channel: MessageChannel) {
        self.sent.with_label_values(&[channel.as_str()]).inc();
    }

    pub(crate) fn record_failed(&self, channel: MessageChannel) {
        self.failed.with_label_values(&[channel.as_str()]).inc();
    }

    pub(crate) fn record_retried(&self, channel: MessageChannel) {
        self.retried.with_label_values(&[channel.as_str()]).inc();
    }

    /// `kind` is `queue` for persistence failures, `delivery` for fail-fast aborts
    pub(crate) fn record_pass_error(&self, kind: &str) {
        self.pass_errors.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled_by_channel() {
        let metrics = CourierMetrics::new("courier-metrics-test");
        metrics.record_sent(MessageChannel::Email);
        metrics.record_sent(MessageChannel::Email);
        metrics.record_failed(MessageChannel::Sms);

        assert_eq!(metrics.sent.with_label_values(&["email"]).get(), 2);
        assert_eq!(metrics.sent.with_label_values(&["sms"]).get(), 0);
        assert_eq!(metrics.failed.with_label_values(&["sms"]).get(), 1);
    }
}
