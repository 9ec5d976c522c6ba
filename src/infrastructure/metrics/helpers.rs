//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BACKEND_ERRORS_TOTAL, EMAILS_TOTAL, EVENTS_DROPPED_TOTAL, EVENTS_FAILED_TOTAL,
    EVENTS_HANDLED_TOTAL, EVENTS_PUBLISHED_TOTAL, EVENTS_RECEIVED_TOTAL, EVENTS_REJECTED_TOTAL,
    FANOUT_DURATION, FANOUT_TARGETS, NOTIFICATIONS_CREATED_TOTAL, PROJECTOR_UPDATES_TOTAL,
    PUSH_CONNECTIONS, PUSH_CONNECTIONS_CLOSED, PUSH_CONNECTIONS_OPENED, PUSH_CONNECTION_DURATION,
    PUSH_FRAMES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording message channel metrics
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_received(topic: &str) {
        EVENTS_RECEIVED_TOTAL.with_label_values(&[topic]).inc();
    }

    pub fn record_rejected(topic: &str) {
        EVENTS_REJECTED_TOTAL.with_label_values(&[topic]).inc();
    }

    /// `reason` is one of "queue_full", "closed"
    pub fn record_dropped(consumer: &str, reason: &str) {
        EVENTS_DROPPED_TOTAL
            .with_label_values(&[consumer, reason])
            .inc();
    }

    pub fn record_handled(consumer: &str) {
        EVENTS_HANDLED_TOTAL.with_label_values(&[consumer]).inc();
    }

    pub fn record_failed(consumer: &str) {
        EVENTS_FAILED_TOTAL.with_label_values(&[consumer]).inc();
    }

    pub fn record_published(topic: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[topic, outcome])
            .inc();
    }
}

/// Helper struct for recording fan-out metrics
pub struct FanoutMetrics;

impl FanoutMetrics {
    pub fn record_created(notification_type: &str, count: usize) {
        NOTIFICATIONS_CREATED_TOTAL
            .with_label_values(&[notification_type])
            .inc_by(count as u64);
    }

    pub fn record_emails(sent: usize, failed: usize, skipped: usize) {
        EMAILS_TOTAL.with_label_values(&["sent"]).inc_by(sent as u64);
        EMAILS_TOTAL
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
        EMAILS_TOTAL
            .with_label_values(&["skipped"])
            .inc_by(skipped as u64);
    }

    pub fn record_run(targets: usize, duration_secs: f64) {
        FANOUT_TARGETS.observe(targets as f64);
        FANOUT_DURATION.observe(duration_secs);
    }
}

/// Helper struct for recording availability projector metrics
pub struct ProjectorMetrics;

impl ProjectorMetrics {
    /// `change` is "borrow" or "return"; `outcome` is "applied" or a skip reason
    pub fn record(change: &str, outcome: &str) {
        PROJECTOR_UPDATES_TOTAL
            .with_label_values(&[change, outcome])
            .inc();
    }
}

/// Helper struct for recording live push metrics
pub struct PushMetrics;

impl PushMetrics {
    pub fn record_opened() {
        PUSH_CONNECTIONS_OPENED.inc();
        PUSH_CONNECTIONS.inc();
    }

    pub fn record_closed(duration_secs: f64) {
        PUSH_CONNECTIONS_CLOSED.inc();
        PUSH_CONNECTIONS.dec();
        PUSH_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn record_frames(delivered: usize, dropped: usize) {
        PUSH_FRAMES_TOTAL
            .with_label_values(&["delivered"])
            .inc_by(delivered as u64);
        PUSH_FRAMES_TOTAL
            .with_label_values(&["dropped"])
            .inc_by(dropped as u64);
    }
}

/// Helper struct for backend metrics
pub struct BackendMetrics;

impl BackendMetrics {
    /// Record backend error
    pub fn record_error(backend: &str, operation: &str) {
        BACKEND_ERRORS_TOTAL
            .with_label_values(&[backend, operation])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_series() {
        ChannelMetrics::record_received("BookAdded");
        FanoutMetrics::record_emails(1, 0, 0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("shelf_events_received_total"));
        assert!(output.contains("shelf_emails_total"));
    }
}
