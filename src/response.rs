//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A handler builds a [`Response`] and returns it. The status is optional:
//! a response whose status was never set goes out as `200 OK`, exactly as
//! if a handler had started writing a body without choosing one.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values gatehouse produces itself.
pub enum ContentType {
    OpenMetrics, // application/openmetrics-text; version=1.0.0; charset=utf-8
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::OpenMetrics => "application/openmetrics-text; version=1.0.0; charset=utf-8",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use gatehouse::Response;
/// use http::StatusCode;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::UNAUTHORIZED)
///     .header("www-authenticate", r#"Basic realm="Restricted""#)
///     .text("Not authorized");
/// ```
#[derive(Debug, Default)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: Option<StatusCode>,
}

impl Response {
    /// `text/plain; charset=utf-8`, status left unset.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with an explicit status and no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: Some(code) }
    }

    /// Builder for responses that need a status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: None }
    }

    /// Wraps a response received from elsewhere, e.g. an upstream. Its
    /// status counts as explicitly set.
    pub fn from_parts(parts: http::response::Parts, body: Bytes) -> Self {
        Self { body, headers: parts.headers, status: Some(parts.status) }
    }

    /// The status that goes on the wire: the explicit one, else `200 OK`.
    pub fn status_code(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// The status a handler set, if any.
    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = self.status_code();
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Leaves the status unset unless
/// [`status`](ResponseBuilder::status) is called. Terminated by a typed body
/// method. Header names or values that are not valid HTTP are skipped.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: Option<StatusCode>,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = Some(code);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: ContentType, body: Bytes) -> Response {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`StatusCode`] directly from a handler.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
