//! Latency start marker.
//!
//! Timing a request from inside the access log itself would miss whatever
//! the log does before calling inward, so the start time is taken by this
//! separate middleware and read back by the log afterwards.

use std::sync::Arc;
use std::time::Instant;

use crate::context::LatencyStart;
use crate::handler::{BoxedHandler, boxed};
use crate::middleware::Middleware;
use crate::request::Request;

/// Stamps the request's [`LatencyStart`] with the current time and calls
/// the wrapped handler.
///
/// Must sit inside [`AccessLog`](super::AccessLog). Everything between the
/// two, and everything inside, counts towards the logged latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Latency;

impl Middleware for Latency {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        boxed(move |req: Request| {
            let next = Arc::clone(&next);
            async move {
                let now = Instant::now();
                let slot = req.get::<LatencyStart>().cloned();
                let req = match slot {
                    Some(slot) => {
                        slot.mark(now);
                        req
                    }
                    None => req.with(LatencyStart::at(now)),
                };
                next.call(req).await
            }
        })
    }
}
