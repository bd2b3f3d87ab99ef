//! Metrics for subscription-service.
//!
//! Request metrics go through the `metrics` facade (recorded by the
//! `service_core` middleware); lifecycle counters live in a dedicated
//! Prometheus registry and are appended to the same scrape output.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static SUBSCRIPTION_ACTIVATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SUBSCRIPTION_NOTIFICATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static WEBHOOK_EVENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to install Prometheus recorder: {0}")]
    Recorder(#[from] BuildError),
    #[error("failed to register metric: {0}")]
    Registry(#[from] prometheus::Error),
    #[error("metrics already initialized")]
    AlreadyInitialized,
}

/// Install the global recorder and register lifecycle counters. Call once.
pub fn init_metrics() -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    let registry = Registry::new();

    let activations = IntCounterVec::new(
        Opts::new(
            "subscription_activations_total",
            "Activation attempts by plan and outcome",
        ),
        &["plan", "outcome"],
    )?;
    let notifications = IntCounterVec::new(
        Opts::new(
            "subscription_notifications_total",
            "Activation notices by outcome",
        ),
        &["outcome"],
    )?;
    let webhook_events = IntCounterVec::new(
        Opts::new(
            "webhook_events_total",
            "Verified webhook deliveries by event type and outcome",
        ),
        &["event", "outcome"],
    )?;

    registry.register(Box::new(activations.clone()))?;
    registry.register(Box::new(notifications.clone()))?;
    registry.register(Box::new(webhook_events.clone()))?;

    PROMETHEUS_REGISTRY
        .set(registry)
        .map_err(|_| MetricsError::AlreadyInitialized)?;
    SUBSCRIPTION_ACTIVATIONS_TOTAL
        .set(activations)
        .map_err(|_| MetricsError::AlreadyInitialized)?;
    SUBSCRIPTION_NOTIFICATIONS_TOTAL
        .set(notifications)
        .map_err(|_| MetricsError::AlreadyInitialized)?;
    WEBHOOK_EVENTS_TOTAL
        .set(webhook_events)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// No-ops until `init_metrics` has run, so tests need no recorder.
pub fn record_activation(plan: &str, outcome: &str) {
    if let Some(counter) = SUBSCRIPTION_ACTIVATIONS_TOTAL.get() {
        counter.with_label_values(&[plan, outcome]).inc();
    }
}

pub fn record_notification(outcome: &str) {
    if let Some(counter) = SUBSCRIPTION_NOTIFICATIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_webhook_event(event: &str, outcome: &str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.with_label_values(&[event, outcome]).inc();
    }
}
