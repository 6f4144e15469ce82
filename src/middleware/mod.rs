//! Middleware and pipeline composition.
//!
//! A middleware turns one handler into another that adds some cross-cutting
//! behaviour around it: checking credentials, stamping a start time, writing
//! an access log record. Middleware know nothing about each other. What one
//! publishes for another travels in the request's
//! [`Context`](crate::context::Context).
//!
//! Order matters. [`compose`] makes the *first* middleware the outermost
//! one: it sees the request first and the response last.
//!
//! ```text
//! compose(proxy, [access_log, latency, auth])
//!
//!   request ──► AccessLog ──► Latency ──► Auth ──► Proxy
//!                                                    │
//!   response ◄── AccessLog ◄── Latency ◄── Auth ◄────┘
//! ```
//!
//! [`Pipeline::standard`] produces that order; it is the only order in which
//! the access log sees a latency start marker and every forwarded request
//! has passed auth.

pub mod access_log;
pub mod auth;
pub mod latency;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler, boxed};

pub use access_log::AccessLog;
pub use auth::{Auth, Credentials};
pub use latency::Latency;

/// Wraps a handler in added behaviour.
///
/// Middleware are built once at startup and shared by every request. State
/// they need is either captured at construction (credentials, a logger) or
/// carried by the request.
///
/// Any `Fn(BoxedHandler) -> BoxedHandler` is a middleware too.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// Wraps `base` in `layers`, the first layer ending up outermost.
///
/// Pure: nothing runs until the returned handler is called.
pub fn compose<I>(base: BoxedHandler, layers: I) -> BoxedHandler
where
    I: IntoIterator<Item = Arc<dyn Middleware>>,
{
    let layers: Vec<_> = layers.into_iter().collect();
    layers
        .iter()
        .rev()
        .fold(base, |next, layer| layer.wrap(next))
}

/// An ordered list of middleware, applied with [`compose`].
///
/// ```rust,no_run
/// use gatehouse::middleware::{AccessLog, Auth, Credentials, Latency, Pipeline};
/// use gatehouse::{Request, Response};
///
/// async fn upstream(_req: Request) -> Response { Response::text("hi") }
///
/// let auth = Some(Auth::new(Credentials::new("user", "secret")));
/// let handler = Pipeline::standard(AccessLog::new(), Latency, auth).build(upstream);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Access log outermost, then latency, then auth when given.
    pub fn standard(access_log: AccessLog, latency: Latency, auth: Option<Auth>) -> Self {
        Self::new().layer(access_log).layer(latency).layer_if(auth)
    }

    /// Appends a layer inside the ones already added.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Appends `middleware` if it is `Some`; deployments turn optional
    /// layers on and off without changing the rest of the order.
    pub fn layer_if(self, middleware: Option<impl Middleware>) -> Self {
        match middleware {
            Some(middleware) => self.layer(middleware),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps `base` in every layer.
    pub fn build(&self, base: impl Handler) -> BoxedHandler {
        compose(boxed(base), self.layers.iter().cloned())
    }
}
