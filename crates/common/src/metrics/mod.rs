//! Metrics and observability utilities
//!
//! Prometheus metrics for the HTTP surface, the upload pipeline and its two
//! external stages (OCR and the chat model).

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ReceiptBox metrics
pub const METRICS_PREFIX: &str = "receiptbox";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s, uploads wait on OCR and the model
    60.00,  // 60s
];

/// Buckets for the OCR and LLM stages (typically slow)
pub const EXTRACTION_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Receipt uploads by outcome"
    );

    describe_counter!(
        format!("{}_upload_bytes_total", METRICS_PREFIX),
        Unit::Bytes,
        "Bytes of receipt images accepted"
    );

    describe_counter!(
        format!("{}_items_extracted_total", METRICS_PREFIX),
        Unit::Count,
        "Line items extracted from receipts"
    );

    // Extraction stage metrics
    describe_histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "OCR and LLM stage latency in seconds"
    );

    describe_counter!(
        format!("{}_extraction_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Failed OCR and LLM calls"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();
        record_request(&self.method, &self.endpoint, status, duration);
    }
}

/// Helper to record one finished HTTP request
pub fn record_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Helper to record an upload attempt
pub fn record_upload(success: bool, bytes: usize, items: usize) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);

    if success {
        counter!(format!("{}_upload_bytes_total", METRICS_PREFIX)).increment(bytes as u64);
        counter!(format!("{}_items_extracted_total", METRICS_PREFIX)).increment(items as u64);
    }
}

/// Helper to record one OCR or LLM call
pub fn record_extraction(stage: &str, provider: &str, duration_secs: f64, success: bool) {
    histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        "stage" => stage.to_string(),
        "provider" => provider.to_string()
    )
    .record(duration_secs);

    if !success {
        counter!(
            format!("{}_extraction_errors_total", METRICS_PREFIX),
            "stage" => stage.to_string(),
            "provider" => provider.to_string()
        )
        .increment(1);
    }
}
