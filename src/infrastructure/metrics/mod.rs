//! Prometheus metrics for the notification service.
//!
//! This module provides metrics for monitoring the event pipeline:
//! - Channel metrics (received, rejected, dropped, handled events per consumer)
//! - Publish metrics (fire-and-forget outcomes per topic)
//! - Fan-out metrics (notifications created, email outcomes)
//! - Projector metrics (availability updates applied or skipped)
//! - Live push metrics (open streams, frames delivered or dropped)
//! - Redis health metrics

mod helpers;

pub use helpers::{
    encode_metrics, BackendMetrics, ChannelMetrics, FanoutMetrics, ProjectorMetrics, PushMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "shelf";

lazy_static! {
    // ============================================================================
    // Channel Metrics
    // ============================================================================

    /// Messages received from the message channel, per topic
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_received_total", METRIC_PREFIX),
        "Total messages received from the message channel",
        &["topic"]
    ).unwrap();

    /// Payloads rejected at the channel boundary
    pub static ref EVENTS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_rejected_total", METRIC_PREFIX),
        "Total malformed payloads rejected at the channel boundary",
        &["topic"]
    ).unwrap();

    /// Events dropped before reaching a handler
    pub static ref EVENTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total events dropped by a consumer",
        &["consumer", "reason"]
    ).unwrap();

    /// Events successfully handled
    pub static ref EVENTS_HANDLED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_handled_total", METRIC_PREFIX),
        "Total events handled by a consumer",
        &["consumer"]
    ).unwrap();

    /// Events whose handler returned an error or panicked
    pub static ref EVENTS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Total events whose handler failed",
        &["consumer"]
    ).unwrap();

    /// Publish attempts by outcome
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_published_total", METRIC_PREFIX),
        "Total publish attempts",
        &["topic", "outcome"]
    ).unwrap();

    // ============================================================================
    // Fan-out Metrics
    // ============================================================================

    /// Notification rows written
    pub static ref NOTIFICATIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_created_total", METRIC_PREFIX),
        "Total notification rows written",
        &["type"]
    ).unwrap();

    /// Email attempts by outcome
    pub static ref EMAILS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_total", METRIC_PREFIX),
        "Total email attempts",
        &["outcome"]
    ).unwrap();

    /// Resolved target set sizes
    pub static ref FANOUT_TARGETS: Histogram = register_histogram!(
        format!("{}_fanout_targets", METRIC_PREFIX),
        "Distribution of resolved target set sizes",
        vec![0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    /// Fan-out duration
    pub static ref FANOUT_DURATION: Histogram = register_histogram!(
        format!("{}_fanout_duration_seconds", METRIC_PREFIX),
        "Fan-out duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Projector Metrics
    // ============================================================================

    /// Availability updates by change and outcome
    pub static ref PROJECTOR_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_projector_updates_total", METRIC_PREFIX),
        "Total availability updates",
        &["change", "outcome"]
    ).unwrap();

    // ============================================================================
    // Live Push Metrics
    // ============================================================================

    /// Open push streams
    pub static ref PUSH_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_push_connections", METRIC_PREFIX),
        "Number of open live push streams"
    ).unwrap();

    /// Push streams opened
    pub static ref PUSH_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_push_connections_opened_total", METRIC_PREFIX),
        "Total live push streams opened"
    ).unwrap();

    /// Push streams closed
    pub static ref PUSH_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_push_connections_closed_total", METRIC_PREFIX),
        "Total live push streams closed"
    ).unwrap();

    /// Push stream lifetime
    pub static ref PUSH_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_push_connection_duration_seconds", METRIC_PREFIX),
        "Live push stream duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Frames by outcome
    pub static ref PUSH_FRAMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_push_frames_total", METRIC_PREFIX),
        "Total push frames by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Redis Metrics
    // ============================================================================

    /// Redis connection status (1 = connected, 0 = disconnected)
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Redis circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref REDIS_CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_redis_circuit_breaker_state", METRIC_PREFIX),
        "Redis circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    /// Redis subscription reconnection attempts
    pub static ref REDIS_RECONNECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_redis_reconnections_total", METRIC_PREFIX),
        "Total Redis subscription reconnection attempts"
    ).unwrap();

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Storage backend errors
    pub static ref BACKEND_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_backend_errors_total", METRIC_PREFIX),
        "Total storage backend errors",
        &["backend", "operation"]
    ).unwrap();
}
