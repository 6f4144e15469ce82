//! Per-request context.
//!
//! Middleware pass values to each other through the request instead of
//! through extra parameters. The store is keyed by *type*: a value of type
//! `T` lives under the key `T`, so two unrelated middleware can only share a
//! slot if they name the same type. Each middleware that publishes something
//! therefore defines its own marker type, like [`LatencyStart`].
//!
//! ```rust
//! use std::time::Instant;
//! use gatehouse::context::{Context, LatencyStart};
//!
//! let mut ctx = Context::default();
//! assert!(ctx.get::<LatencyStart>().is_none());
//!
//! ctx.insert(LatencyStart::at(Instant::now()));
//! assert!(ctx.get::<LatencyStart>().is_some());
//! ```

use std::any::type_name;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use http::Extensions;

/// Write-once slot for the moment a request entered the timed part of the
/// pipeline.
///
/// [`AccessLog`](crate::middleware::access_log::AccessLog) puts an empty
/// slot into the context and keeps a handle to it;
/// [`Latency`](crate::middleware::latency::Latency), further in, stamps it.
/// Once the inner handlers return, the access log reads the stamp through
/// its own handle, because the request itself has been moved inward by then.
#[derive(Clone, Debug, Default)]
pub struct LatencyStart(Arc<OnceLock<Instant>>);

impl LatencyStart {
    /// A slot already stamped with `at`.
    pub fn at(at: Instant) -> Self {
        let slot = Self::default();
        slot.mark(at);
        slot
    }

    /// Stamps the slot. Only the first stamp counts.
    pub fn mark(&self, at: Instant) {
        let _ = self.0.set(at);
    }

    pub fn get(&self) -> Option<Instant> {
        self.0.get().copied()
    }

    /// # Panics
    ///
    /// Panics when the slot was never stamped: no `Latency` ran inside the
    /// middleware that created it.
    pub fn require(&self) -> Instant {
        match self.get() {
            Some(at) => at,
            None => panic!(
                "`{}` was never stamped: Latency must be composed inside AccessLog",
                type_name::<Self>()
            ),
        }
    }
}

/// Typed value store owned by one request.
///
/// Never shared between requests and dropped with the request, so it needs
/// no locking.
#[derive(Default)]
pub struct Context {
    values: Extensions,
}

impl Context {
    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T>(&mut self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values.insert(value)
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }

    /// Returns the value of type `T` that an outer middleware was required
    /// to store.
    ///
    /// # Panics
    ///
    /// Panics when no such value exists. That only happens when the pipeline
    /// was composed in the wrong order, and carrying on would log made-up
    /// data.
    pub fn require<T>(&self) -> &T
    where
        T: Send + Sync + 'static,
    {
        match self.values.get::<T>() {
            Some(value) => value,
            None => panic!(
                "request context has no `{}`: the middleware that stores it must wrap the one that reads it",
                type_name::<T>()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("len", &self.values.len()).finish()
    }
}
