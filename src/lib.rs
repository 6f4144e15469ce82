//! # gatehouse
//!
//! A reverse proxy for a single upstream, with the cross-cutting parts of
//! request handling split into independent middleware.
//!
//! ## The pipeline
//!
//! Every request except `/metrics` runs through
//!
//! ```text
//! AccessLog → Latency → [Auth] → Proxy
//! ```
//!
//! - [`AccessLog`](middleware::AccessLog) writes one structured record per
//!   request once the response is known.
//! - [`Latency`](middleware::Latency) stamps the start time the log
//!   measures from.
//! - [`Auth`](middleware::Auth) checks basic credentials; optional.
//! - [`Proxy`](proxy::Proxy) forwards to the upstream.
//!
//! Middleware are independent of each other. They are combined with
//! [`compose`](middleware::compose) or a [`Pipeline`](middleware::Pipeline),
//! and share per-request values through the request's
//! [`Context`](context::Context).
//!
//! What gatehouse intentionally ignores: health checks, load balancing,
//! TLS, rate limiting, and keeping logs or metrics anywhere but stdout and
//! the `/metrics` endpoint.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::log::Logger;
//! use gatehouse::{Config, Metrics, Server, app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let config = Config::from_env()?;
//!     let router = app::build(&config, Arc::new(Metrics::new()), Logger::ambient());
//!     Server::bind(config.listen).serve(router).await
//! }
//! ```

pub mod app;
pub mod config;
pub mod context;
mod error;
pub mod handler;
pub mod log;
pub mod metrics;
pub mod middleware;
pub mod proxy;
mod request;
mod response;
mod router;
mod server;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ConfigError, Error};
pub use handler::{BoxedHandler, Handler};
pub use metrics::Metrics;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
