//! Structured access log: one record per completed request.
//!
//! A record has two groups of fields, emitted with dotted names that
//! [`JsonLines`](crate::log::JsonLines) writes as a `request` and a
//! `response` object:
//!
//! | Field | Meaning |
//! |---|---|
//! | `request.host` | `Host` header, else URI authority |
//! | `request.requestUri` | Request target as received |
//! | `request.remoteAddr` | Peer `ip:port` |
//! | `request.method` | Request method |
//! | `request.headers` | Object, one string per header name |
//! | `response.status` | Status that went on the wire |
//! | `response.latency` | Whole milliseconds since [`Latency`](super::Latency) ran |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use serde::Serialize;
use tracing::info;

use crate::context::LatencyStart;
use crate::handler::{BoxedHandler, boxed};
use crate::log::Logger;
use crate::metrics::Metrics;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::tracker::StatusTracker;

/// Joins the values of a repeated header.
pub const HEADER_DELIMITER: &str = ",";

/// Everything one access log line says about a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub request: RequestRecord,
    pub response: ResponseRecord,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub host: String,
    pub request_uri: String,
    pub remote_addr: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseRecord {
    pub status: u16,
    /// Milliseconds.
    pub latency: u64,
}

impl RequestRecord {
    pub fn from_request(req: &Request) -> Self {
        Self {
            host: req.host().to_owned(),
            request_uri: req.request_uri(),
            remote_addr: req.remote_addr().to_string(),
            method: req.method().to_string(),
            headers: flatten_headers(req.headers()),
        }
    }
}

/// One entry per header name, repeated values joined with
/// [`HEADER_DELIMITER`] in the order received.
///
/// Names come out lower-case. Values that are not valid UTF-8 are decoded
/// lossily. Good enough to read, not to replay.
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(HEADER_DELIMITER);
            (name.as_str().to_owned(), joined)
        })
        .collect()
}

/// Whole milliseconds, rounded down.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Writes an [`AccessRecord`] after the wrapped handler has produced its
/// response.
///
/// Must be the outermost middleware, with [`Latency`](super::Latency)
/// somewhere inside it.
///
/// # Panics
///
/// The returned handler panics if no `Latency` ran inside it: the pipeline
/// was composed in the wrong order.
#[derive(Clone, Debug, Default)]
pub struct AccessLog {
    logger: Logger,
    metrics: Option<Arc<Metrics>>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self { logger: Logger::ambient(), metrics: None }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Also count each request and its duration in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn emit(&self, record: &AccessRecord) {
        let headers = serde_json::to_string(&record.request.headers).unwrap_or_default();
        self.logger.emit(|| {
            info!(
                request.host = %record.request.host,
                request.requestUri = %record.request.request_uri,
                request.remoteAddr = %record.request.remote_addr,
                request.method = %record.request.method,
                request.headers = %headers,
                response.status = record.response.status,
                response.latency = record.response.latency,
            );
        });
    }
}

impl Middleware for AccessLog {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let log = self.clone();
        boxed(move |req: Request| {
            let next = Arc::clone(&next);
            let log = log.clone();
            async move {
                let start = LatencyStart::default();
                let req = req.with(start.clone());
                let request = RequestRecord::from_request(&req);

                let mut tracker = StatusTracker::new();
                let res = tracker.observe(next.call(req).await);

                let elapsed = Instant::now().saturating_duration_since(start.require());
                let record = AccessRecord {
                    request,
                    response: ResponseRecord {
                        status: tracker.status().as_u16(),
                        latency: millis(elapsed),
                    },
                };
                log.emit(&record);
                if let Some(metrics) = &log.metrics {
                    metrics.record_request(&record.request.method, record.response.status, elapsed.as_secs_f64());
                }
                res
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::middleware::{Latency, Pipeline};
    use crate::response::Response;
    use crate::log::MemorySink;
    use crate::testing::{get, request};

    fn pipeline(captured: &MemorySink) -> Pipeline {
        Pipeline::standard(
            AccessLog::new().with_logger(Logger::to(captured.dispatch())),
            Latency,
            None,
        )
    }

    #[tokio::test]
    async fn logs_ok_when_status_never_set() {
        let captured = MemorySink::new();
        let handler = pipeline(&captured).build(|_req: Request| async { Response::text("fine") });

        handler.call(get("/")).await;

        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "INFO");
        assert_eq!(records[0]["fields"]["response"]["status"], 200);
    }

    #[tokio::test]
    async fn logs_explicit_status() {
        let captured = MemorySink::new();
        let handler = pipeline(&captured)
            .build(|_req: Request| async { Response::status(StatusCode::SERVICE_UNAVAILABLE) });

        let res = handler.call(get("/")).await;

        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(captured.records()[0]["fields"]["response"]["status"], 503);
    }

    #[tokio::test]
    async fn latency_covers_the_inner_handler() {
        let captured = MemorySink::new();
        let handler = pipeline(&captured).build(|_req: Request| async {
            tokio::time::sleep(Duration::from_millis(25)).await;
            Response::default()
        });

        let before = Instant::now();
        handler.call(get("/")).await;
        let measured = millis(before.elapsed());

        let logged = captured.records()[0]["fields"]["response"]["latency"].as_u64().unwrap();
        assert!(logged >= 25, "logged {logged}ms");
        assert!(logged <= measured, "logged {logged}ms, measured {measured}ms");
    }

    #[tokio::test]
    async fn logs_request_metadata() {
        let captured = MemorySink::new();
        let handler = pipeline(&captured).build(|_req: Request| async { Response::default() });

        handler
            .call(request(
                http::Request::post("/orders?draft=1")
                    .header("host", "shop.example")
                    .header("accept", "text/html")
                    .header("accept", "application/json"),
            ))
            .await;

        let records = captured.records();
        let fields = &records[0]["fields"];
        assert_eq!(fields["request"]["host"], "shop.example");
        assert_eq!(fields["request"]["requestUri"], "/orders?draft=1");
        assert_eq!(fields["request"]["remoteAddr"], "192.0.2.10:40000");
        assert_eq!(fields["request"]["method"], "POST");

        assert!(fields["request"].is_object());
        assert!(fields["response"].is_object());
        assert!(fields["request"]["headers"].is_object());
        assert_eq!(fields["request"]["headers"]["accept"], "text/html,application/json");
        assert_eq!(fields["request"]["headers"]["host"], "shop.example");
    }

    #[tokio::test]
    async fn counts_requests_when_metrics_attached() {
        let metrics = Arc::new(Metrics::new());
        let captured = MemorySink::new();
        let handler = Pipeline::standard(
            AccessLog::new()
                .with_logger(Logger::to(captured.dispatch()))
                .with_metrics(Arc::clone(&metrics)),
            Latency,
            None,
        )
        .build(|_req: Request| async { StatusCode::NOT_FOUND });

        handler.call(get("/missing")).await;

        assert_eq!(metrics.requests("GET", 404), 1);
    }

    #[test]
    fn flatten_keeps_value_order() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", "10.0.0.1".parse().unwrap());
        headers.append("x-forwarded-for", "10.0.0.2".parse().unwrap());
        headers.append("x-single", "one".parse().unwrap());

        let flat = flatten_headers(&headers);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat["x-forwarded-for"], "10.0.0.1,10.0.0.2");
        assert_eq!(flat["x-single"], "one");
    }

    #[test]
    fn record_serializes_in_two_groups() {
        let record = AccessRecord {
            request: RequestRecord {
                host: "h".into(),
                request_uri: "/".into(),
                remote_addr: "127.0.0.1:1".into(),
                method: "GET".into(),
                headers: BTreeMap::new(),
            },
            response: ResponseRecord { status: 200, latency: 3 },
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["request"]["requestUri"], "/");
        assert_eq!(json["request"]["remoteAddr"], "127.0.0.1:1");
        assert_eq!(json["response"]["latency"], 3);
    }
}
