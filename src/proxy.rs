//! Single-host reverse proxy: the innermost handler of the pipeline.
//!
//! Requests are re-targeted at the upstream and sent over a pooled HTTP/1.1
//! client. Method, headers and body pass through unchanged apart from the
//! hop-by-hop headers, which belong to a single connection, and
//! `X-Forwarded-For`, which gains the client's address. Nothing is retried.
//! When the upstream cannot be reached the client gets `502 Bad Gateway`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONNECTION, HeaderName, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::error;

use crate::error::Error;
use crate::handler::{BoxedHandler, boxed};
use crate::log::Logger;
use crate::request::Request;
use crate::response::Response;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe one connection and are never forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// ── Upstream ──────────────────────────────────────────────────────────────────

/// An upstream address that cannot be proxied to.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidUpstream(String);

/// The service requests are forwarded to: scheme, authority, and an optional
/// base path and query that every forwarded request inherits.
///
/// ```rust
/// use gatehouse::proxy::Upstream;
///
/// let upstream: Upstream = "http://localhost:3000".parse().unwrap();
/// let target = upstream.target(&"/users?page=2".parse().unwrap()).unwrap();
/// assert_eq!(target, "http://localhost:3000/users?page=2");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

impl Upstream {
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// The URI a request for `uri` is sent to.
    ///
    /// The base path and the request path are joined with exactly one
    /// slash. Queries from both sides are kept, upstream's first.
    pub fn target(&self, uri: &Uri) -> Result<Uri, http::Error> {
        let path = join_paths(&self.base_path, uri.path());
        let query = match (self.base_query.as_deref(), uri.query()) {
            (Some(base), Some(own)) if !base.is_empty() && !own.is_empty() => Some(format!("{base}&{own}")),
            (Some(base), _) if !base.is_empty() => Some(base.to_owned()),
            (_, Some(own)) => Some(own.to_owned()),
            _ => None,
        };
        let path_and_query = match query {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(PathAndQuery::try_from(path_and_query)?)
            .build()
    }
}

impl FromStr for Upstream {
    type Err = InvalidUpstream;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s.parse().map_err(|e| InvalidUpstream(format!("{e}")))?;
        let parts = uri.into_parts();
        let scheme = parts
            .scheme
            .ok_or_else(|| InvalidUpstream("missing scheme".to_owned()))?;
        if scheme != Scheme::HTTP {
            return Err(InvalidUpstream(format!("unsupported scheme `{scheme}`, only http")));
        }
        let authority = parts
            .authority
            .ok_or_else(|| InvalidUpstream("missing host".to_owned()))?;
        let (base_path, base_query) = match parts.path_and_query {
            Some(pq) => (pq.path().to_owned(), pq.query().map(str::to_owned)),
            None => ("/".to_owned(), None),
        };
        Ok(Self { scheme, authority, base_path, base_query })
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)?;
        if let Some(query) = &self.base_query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

// ── Header hygiene ────────────────────────────────────────────────────────────

/// Removes hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Appends the client IP to `X-Forwarded-For`, folding earlier values into
/// one comma-separated header.
fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let mut chain: Vec<String> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect();
    chain.push(client_ip.to_owned());
    if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

/// Forwards requests to one [`Upstream`].
#[derive(Clone, Debug)]
pub struct Proxy {
    upstream: Arc<Upstream>,
    client: Client<HttpConnector, Full<Bytes>>,
    logger: Logger,
}

impl Proxy {
    pub fn new(upstream: Upstream) -> Self {
        Self {
            upstream: Arc::new(upstream),
            client: Client::builder(TokioExecutor::new()).build_http(),
            logger: Logger::ambient(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Sends `req` upstream and buffers the reply.
    pub async fn forward(&self, req: Request) -> Result<Response, Error> {
        let uri = self.upstream.target(req.uri())?;

        let mut headers = req.headers;
        strip_hop_by_hop(&mut headers);
        append_forwarded_for(&mut headers, &req.remote_addr.ip().to_string());

        let mut outbound = http::Request::new(Full::new(req.body));
        *outbound.method_mut() = req.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let (mut parts, body) = self.client.request(outbound).await?.into_parts();
        let body = body.collect().await?.to_bytes();
        strip_hop_by_hop(&mut parts.headers);

        Ok(Response::from_parts(parts, body))
    }

    /// The proxy as a handler: failures become `502 Bad Gateway`.
    pub fn into_handler(self) -> BoxedHandler {
        let proxy = Arc::new(self);
        boxed(move |req: Request| {
            let proxy = Arc::clone(&proxy);
            async move {
                match proxy.forward(req).await {
                    Ok(res) => res,
                    Err(e) => {
                        proxy.logger.emit(|| {
                            error!(upstream = %proxy.upstream, error = %e, "proxy error");
                        });
                        Response::status(StatusCode::BAD_GATEWAY)
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::log::MemorySink;
    use crate::testing::get;

    fn upstream(s: &str) -> Upstream {
        s.parse().unwrap()
    }

    fn target(base: &str, path: &str) -> String {
        upstream(base).target(&path.parse().unwrap()).unwrap().to_string()
    }

    #[test]
    fn target_joins_paths_with_one_slash() {
        assert_eq!(target("http://localhost:3000", "/a/b"), "http://localhost:3000/a/b");
        assert_eq!(target("http://localhost:3000/api", "/a"), "http://localhost:3000/api/a");
        assert_eq!(target("http://localhost:3000/api/", "/a"), "http://localhost:3000/api/a");
        assert_eq!(target("http://localhost:3000/api/", "/"), "http://localhost:3000/api/");
    }

    #[test]
    fn target_merges_queries() {
        assert_eq!(target("http://up:1/?k=1", "/x?q=2"), "http://up:1/x?k=1&q=2");
        assert_eq!(target("http://up:1/?k=1", "/x"), "http://up:1/x?k=1");
        assert_eq!(target("http://up:1", "/x?q=2"), "http://up:1/x?q=2");
    }

    #[test]
    fn target_ignores_inbound_authority() {
        assert_eq!(
            target("http://localhost:3000", "http://elsewhere.example/p?q=1"),
            "http://localhost:3000/p?q=1"
        );
    }

    #[test]
    fn parse_rejects_non_http() {
        assert!("https://secure:443".parse::<Upstream>().is_err());
        assert!("localhost:3000".parse::<Upstream>().is_err());
        assert!("/just/a/path".parse::<Upstream>().is_err());
    }

    #[test]
    fn hop_by_hop_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive, x-session-hint".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("x-session-hint", "abc".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("accept", "*/*".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept"], "*/*");
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", "203.0.113.1".parse().unwrap());
        headers.append("x-forwarded-for", "203.0.113.2".parse().unwrap());

        append_forwarded_for(&mut headers, "192.0.2.10");

        assert_eq!(headers.get_all("x-forwarded-for").iter().count(), 1);
        assert_eq!(headers["x-forwarded-for"], "203.0.113.1, 203.0.113.2, 192.0.2.10");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        // Bind and release a port so nothing is listening on it.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let captured = MemorySink::new();
        let handler = Proxy::new(upstream(&format!("http://127.0.0.1:{port}")))
            .with_logger(Logger::to(captured.dispatch()))
            .into_handler();

        let res = handler.call(get("/")).await;

        assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
        let records = captured.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "ERROR");
        assert_eq!(records[0]["fields"]["message"], "proxy error");
    }
}
