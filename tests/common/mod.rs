//! Shared fixtures: a stub upstream, a running gatehouse, and a client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use gatehouse::handler::boxed;
use gatehouse::log::MemorySink;
use gatehouse::middleware::Credentials;
use gatehouse::{Config, Metrics, Request, Response, Router, Server, app};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

// ── Servers ───────────────────────────────────────────────────────────────────

/// A server running in the background until dropped.
pub struct Running {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn(router: Router) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        Server::from_listener(listener)
            .serve_with_shutdown(router, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });
    Running { addr, shutdown: Some(tx) }
}

/// Stub upstream. Replies with the status named in `x-want-status`
/// (default: unset, so 200) and a body describing what it received.
pub struct Upstream {
    pub server: Running,
    pub hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new().fallback(boxed(move |req: Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let summary = format!(
                "{} {} xff={} body={}",
                req.method(),
                req.request_uri(),
                req.header("x-forwarded-for").unwrap_or(""),
                String::from_utf8_lossy(req.body()),
            );
            match req.header("x-want-status").and_then(|s| s.parse::<u16>().ok()) {
                Some(code) => Response::builder()
                    .status(StatusCode::from_u16(code).unwrap())
                    .text(summary),
                None => Response::text(summary),
            }
        }
    }));
    Upstream { server: spawn(router).await, hits }
}

pub struct Gatehouse {
    pub server: Running,
    pub metrics: Arc<Metrics>,
    pub logs: MemorySink,
}

/// A gatehouse in front of `upstream`, with auth when `auth` is set.
pub async fn gatehouse(upstream: &Upstream, auth: bool) -> Gatehouse {
    let config = Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        upstream: format!("http://{}", upstream.server.addr).parse().unwrap(),
        auth: auth.then(|| Credentials::new("user", "secret")),
        log_passwords: false,
    };
    let metrics = Arc::new(Metrics::new());
    let logs = MemorySink::new();
    let router = app::build(&config, Arc::clone(&metrics), logs.logger());
    Gatehouse { server: spawn(router).await, metrics, logs }
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Reply {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: String,
}

pub async fn send(req: http::Request<Full<Bytes>>) -> Reply {
    let client: Client<HttpConnector, Full<Bytes>> =
        Client::builder(TokioExecutor::new()).build_http();
    let res = client.request(req).await.unwrap();
    let (parts, body) = res.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub fn get(addr: SocketAddr, path: &str) -> http::request::Builder {
    http::Request::get(format!("http://{addr}{path}"))
}

pub fn empty(builder: http::request::Builder) -> http::Request<Full<Bytes>> {
    builder.body(Full::new(Bytes::new())).unwrap()
}
