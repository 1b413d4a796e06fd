//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Once;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("github_login_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "github_login_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // GitHub Metrics
    pub static ref OAUTH_EXCHANGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("github_login_oauth_exchanges_total", "Total number of OAuth token exchanges"),
        &["grant", "outcome"]
    ).expect("metric can be created");
    pub static ref GITHUB_API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("github_login_github_api_requests_total", "Total number of GitHub REST API requests"),
        &["endpoint", "outcome"]
    ).expect("metric can be created");
    pub static ref GITHUB_API_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "github_login_github_api_duration_seconds",
            "GitHub request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["endpoint"]
    ).expect("metric can be created");

    // Session Metrics
    pub static ref SESSIONS_ACTIVE: IntGauge = IntGauge::new(
        "github_login_sessions_active",
        "Current number of in-memory sessions"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("github_login_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(HTTP_REQUESTS_TOTAL.clone()),
            Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
            Box::new(OAUTH_EXCHANGES_TOTAL.clone()),
            Box::new(GITHUB_API_REQUESTS_TOTAL.clone()),
            Box::new(GITHUB_API_DURATION_SECONDS.clone()),
            Box::new(SESSIONS_ACTIVE.clone()),
            Box::new(ERRORS_TOTAL.clone()),
        ];

        for collector in collectors {
            if let Err(error) = REGISTRY.register(collector) {
                tracing::warn!(%error, "Failed to register metric");
            }
        }

        tracing::info!("Metrics registry initialized");
    });
}
