use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, TextEncoder,
    register_histogram_vec, register_int_counter_vec,
};
use std::time::Instant;

use crate::{BridgeError, Result};

lazy_static! {
    // Query metrics
    pub static ref QUERY_COUNTER: IntCounterVec = register_int_counter_vec!(
        "external_metric_queries_total",
        "Total number of external metric queries by backend and outcome",
        &["backend", "outcome"]
    ).unwrap();

    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "external_metric_query_duration_seconds",
        "External metric query duration in seconds",
        &["backend"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();
}

/// Observes the query duration for `backend` when dropped.
pub struct QueryTimer {
    backend: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        QUERY_DURATION.with_label_values(&[self.backend]).observe(duration);
    }
}

pub fn record_query<T>(backend: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) if err.is_invalid_request() => "invalid_request",
        Err(_) => "failure",
    };
    QUERY_COUNTER.with_label_values(&[backend, outcome]).inc();
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| BridgeError::Config(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| BridgeError::Config(format!("Metrics are not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_query_outcomes() {
        let ok: Result<f64> = Ok(1.0);
        let invalid: Result<f64> = Err(BridgeError::MissingField("metricName"));
        let failed: Result<f64> = Err(BridgeError::BackendUnavailable("down".into()));

        let before = QUERY_COUNTER.with_label_values(&["test", "invalid_request"]).get();
        record_query("test", &ok);
        record_query("test", &invalid);
        record_query("test", &failed);

        assert!(QUERY_COUNTER.with_label_values(&["test", "success"]).get() >= 1);
        assert_eq!(
            QUERY_COUNTER.with_label_values(&["test", "invalid_request"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_timer_and_gather() {
        {
            let _timer = QueryTimer::new("timer_test");
        }
        assert!(QUERY_DURATION.with_label_values(&["timer_test"]).get_sample_count() >= 1);

        let text = gather_text().unwrap();
        assert!(text.contains("external_metric_query_duration_seconds"));
    }
}
