use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::errors::{AppError, Result};
use crate::rules::GlucoseStatus;

/// Process-wide Prometheus registry and the collectors the service records to.
pub struct MetricsService {
    registry: Registry,
    http_requests: IntCounterVec,
    request_duration: HistogramVec,
    readings_recorded: IntCounterVec,
    companion_requests: IntCounterVec,
}

impl MetricsService {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by method, route and status"),
            &["method", "route", "status"],
        )
        .map_err(metrics_error)?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latency"),
            &["method", "route"],
        )
        .map_err(metrics_error)?;
        let readings_recorded = IntCounterVec::new(
            Opts::new("glucose_readings_total", "Glucose readings recorded by status"),
            &["status"],
        )
        .map_err(metrics_error)?;
        let companion_requests = IntCounterVec::new(
            Opts::new("companion_requests_total", "Companion requests by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(http_requests.clone())).map_err(metrics_error)?;
        registry.register(Box::new(request_duration.clone())).map_err(metrics_error)?;
        registry.register(Box::new(readings_recorded.clone())).map_err(metrics_error)?;
        registry.register(Box::new(companion_requests.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            http_requests,
            request_duration,
            readings_recorded,
            companion_requests,
        })
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16, duration: Duration) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[method, route])
            .observe(duration.as_secs_f64());
    }

    pub fn record_reading(&self, status: GlucoseStatus) {
        self.readings_recorded.with_label_values(&[status.as_str()]).inc();
    }

    /// `outcome` is one of `answered`, `exhausted` or `failed`.
    pub fn record_companion(&self, outcome: &str) {
        self.companion_requests.with_label_values(&[outcome]).inc();
    }

    /// Text exposition of every registered collector.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| AppError::Internal(e.into()))
    }
}

fn metrics_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Metrics error: {}", e))
}
