//! Path router.
//!
//! Exact paths live in a radix tree, O(path-length) lookup. Everything that
//! matches no path goes to the fallback handler, which is how the proxy
//! pipeline catches "all other traffic" while `/metrics` stays separate.

use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::BoxedHandler;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
///
/// ```rust,no_run
/// # use gatehouse::{Request, Response, Router, handler::boxed};
/// # async fn metrics(_: Request) -> Response { Response::text("") }
/// # async fn forward(_: Request) -> Response { Response::text("") }
/// Router::new()
///     .route("/metrics", boxed(metrics))
///     .fallback(boxed(forward));
/// ```
pub struct Router {
    routes: MatchitRouter<BoxedHandler>,
    fallback: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: MatchitRouter::new(), fallback: None }
    }

    /// Register a handler for one path, any method.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or is already registered.
    /// Routes are fixed at startup, so this is a programming error.
    pub fn route(mut self, path: &str, handler: BoxedHandler) -> Self {
        self.routes
            .insert(path, handler)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Handler for every path no route matches.
    pub fn fallback(mut self, handler: BoxedHandler) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<BoxedHandler> {
        match self.routes.at(path) {
            Ok(matched) => Some(Arc::clone(matched.value)),
            Err(_) => self.fallback.clone(),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
