//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

use crate::context::Context;

/// An incoming HTTP request with its body already buffered.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) context: Context,
}

impl Request {
    /// Builds a request from an `http` request whose body has been read.
    ///
    /// The server does this for every inbound request; it is public so
    /// middleware can be driven directly in tests.
    pub fn from_http(req: http::Request<Bytes>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr,
            context: Context::default(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn context(&self) -> &Context { &self.context }

    /// Case-insensitive header lookup. Returns the first value, and `None`
    /// for values that are not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The host the client addressed: the `Host` header, else the URI
    /// authority, else an empty string.
    pub fn host(&self) -> &str {
        self.header("host")
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// The request target as sent on the request line.
    ///
    /// Origin-form targets come back as path plus query (`/a?b=1`);
    /// absolute-form targets, as sent to forward proxies, in full.
    pub fn request_uri(&self) -> String {
        if self.uri.scheme().is_some() {
            return self.uri.to_string();
        }
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| "/".to_owned())
    }

    /// Returns the request with `value` stored in its context.
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.context.insert(value);
        self
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.context.get::<T>()
    }

    /// See [`Context::require`].
    pub fn require<T>(&self) -> &T
    where
        T: Send + Sync + 'static,
    {
        self.context.require::<T>()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
