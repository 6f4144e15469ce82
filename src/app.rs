//! Wires configuration into a router.

use std::sync::Arc;

use crate::config::Config;
use crate::log::Logger;
use crate::metrics::{self, Metrics};
use crate::middleware::{AccessLog, Auth, Latency, Pipeline};
use crate::proxy::Proxy;
use crate::router::Router;

/// `/metrics` served directly; every other path through
/// access log → latency → [auth] → proxy.
///
/// Every middleware and the proxy write their records through `logger`.
pub fn build(config: &Config, metrics: Arc<Metrics>, logger: Logger) -> Router {
    let auth = config.auth.clone().map(|credentials| {
        Auth::new(credentials)
            .log_passwords(config.log_passwords)
            .with_logger(logger.clone())
            .with_metrics(Arc::clone(&metrics))
    });

    let pipeline = Pipeline::standard(
        AccessLog::new()
            .with_logger(logger.clone())
            .with_metrics(Arc::clone(&metrics)),
        Latency,
        auth,
    );

    let proxy = Proxy::new(config.upstream.clone())
        .with_logger(logger)
        .into_handler();

    Router::new()
        .route("/metrics", metrics::handler(metrics))
        .fallback(pipeline.build(proxy))
}
