use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

use crate::models::PaymentStatus;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SCHEDULER_ACTIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let payments_counter = IntCounterVec::new(
        Opts::new(
            "gateway_payments_total",
            "Payments persisted by resulting status",
        ),
        &["status"],
    )
    .expect("Failed to create gateway_payments_total metric");

    let scheduler_counter = IntCounterVec::new(
        Opts::new(
            "scheduler_actions_total",
            "Bulk scheduler activity by scheduler and fan-out level",
        ),
        &["scheduler", "level"],
    )
    .expect("Failed to create scheduler_actions_total metric");

    registry
        .register(Box::new(payments_counter.clone()))
        .expect("Failed to register gateway_payments_total");
    registry
        .register(Box::new(scheduler_counter.clone()))
        .expect("Failed to register scheduler_actions_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    PAYMENTS_TOTAL
        .set(payments_counter)
        .expect("Failed to set gateway_payments_total");
    SCHEDULER_ACTIONS_TOTAL
        .set(scheduler_counter)
        .expect("Failed to set scheduler_actions_total");
}

/// Count a persisted payment by status. No-op before `init_metrics`.
pub fn observe_payment(status: PaymentStatus) {
    if let Some(counter) = PAYMENTS_TOTAL.get() {
        counter.with_label_values(&[status.as_str()]).inc();
    }
}

/// Count scheduler fan-out activity. No-op before `init_metrics`.
pub fn observe_scheduler(scheduler: &str, level: &str) {
    if let Some(counter) = SCHEDULER_ACTIONS_TOTAL.get() {
        counter.with_label_values(&[scheduler, level]).inc();
    }
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
