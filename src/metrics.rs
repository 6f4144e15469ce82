//! Prometheus metrics and the `/metrics` exposition handler.
//!
//! The endpoint is mounted next to the proxy pipeline, not inside it: a
//! scrape is neither authenticated nor access-logged.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tracing::error;

use crate::handler::{BoxedHandler, boxed};
use crate::request::Request;
use crate::response::{ContentType, Response};

/// Labels of a completed proxied request.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub method: String,
    pub status: u16,
}

/// Process-wide metrics registry.
pub struct Metrics {
    registry: Registry,

    /// Completed requests by method/status.
    requests: Family<RequestLabels, Counter>,

    /// Time spent in the pipeline, in seconds.
    duration_seconds: Histogram,

    /// Requests turned away by basic auth.
    auth_failures: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("gatehouse");

        let requests = Family::<RequestLabels, Counter>::default();
        registry.register("requests", "Requests that completed the pipeline", requests.clone());

        let duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 12));
        registry.register(
            "request_duration_seconds",
            "Time requests spent in the pipeline",
            duration_seconds.clone(),
        );

        let auth_failures = Counter::default();
        registry.register(
            "auth_failures",
            "Requests rejected by basic auth",
            auth_failures.clone(),
        );

        Self { registry, requests, duration_seconds, auth_failures }
    }

    /// Record a completed request.
    pub fn record_request(&self, method: &str, status: u16, duration_secs: f64) {
        let labels = RequestLabels { method: method.to_owned(), status };
        self.requests.get_or_create(&labels).inc();
        self.duration_seconds.observe(duration_secs);
    }

    /// Record a basic-auth rejection.
    pub fn record_auth_failure(&self) {
        self.auth_failures.inc();
    }

    /// Completed requests with these labels; reading never creates a series.
    pub fn requests(&self, method: &str, status: u16) -> u64 {
        let labels = RequestLabels { method: method.to_owned(), status };
        self.requests.get(&labels).map(|counter| counter.get()).unwrap_or(0)
    }

    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.get()
    }

    /// Encode metrics in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Serves the current contents of `metrics`.
pub fn handler(metrics: Arc<Metrics>) -> BoxedHandler {
    boxed(move |_req: Request| {
        let metrics = Arc::clone(&metrics);
        async move {
            match metrics.encode() {
                Ok(body) => Response::builder()
                    .status(StatusCode::OK)
                    .bytes(ContentType::OpenMetrics, body),
                Err(e) => {
                    error!("encoding metrics: {e}");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::get;

    #[test]
    fn registers_every_family() {
        let output = Metrics::new().encode().unwrap();
        assert!(output.contains("gatehouse_requests"));
        assert!(output.contains("gatehouse_request_duration_seconds"));
        assert!(output.contains("gatehouse_auth_failures_total"));
        assert!(output.ends_with("# EOF\n"));
    }

    #[test]
    fn record_request_counts_by_labels() {
        let metrics = Metrics::new();
        metrics.record_request("GET", 200, 0.012);
        metrics.record_request("GET", 200, 0.020);
        metrics.record_request("POST", 502, 0.001);

        assert_eq!(metrics.requests("GET", 200), 2);
        assert_eq!(metrics.requests("POST", 502), 1);
        assert!(metrics.encode().unwrap().contains(r#"gatehouse_requests_total{method="GET",status="200"} 2"#));
    }

    #[test]
    fn reading_an_unseen_series_does_not_create_it() {
        let metrics = Metrics::new();

        assert_eq!(metrics.requests("DELETE", 418), 0);

        assert!(!metrics.encode().unwrap().contains("DELETE"));
    }

    #[tokio::test]
    async fn handler_serves_exposition() {
        let metrics = Arc::new(Metrics::new());
        metrics.record_auth_failure();

        let res = handler(Arc::clone(&metrics)).call(get("/metrics")).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(
            res.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("application/openmetrics-text")
        );
        let body = String::from_utf8(res.body().to_vec()).unwrap();
        assert!(body.contains("gatehouse_auth_failures_total 1"));
    }
}
