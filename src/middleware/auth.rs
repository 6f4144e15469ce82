//! HTTP Basic authentication against a single static credential pair.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use subtle::ConstantTimeEq;
use tracing::{error, info};

use crate::handler::{BoxedHandler, boxed};
use crate::log::Logger;
use crate::metrics::Metrics;
use crate::middleware::Middleware;
use crate::request::Request;
use crate::response::Response;

/// Value of the `WWW-Authenticate` challenge sent with every rejection.
pub const CHALLENGE: &str = r#"Basic realm="Restricted""#;

/// Body of every rejection.
pub const DENIED: &str = "Not authorized";

const REDACTED: &str = "[redacted]";

/// The username/password pair a client must present.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Exact match on both halves. Compares in constant time for equal
    /// lengths.
    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Parses `Authorization: Basic <base64(user:pass)>`.
///
/// The scheme is matched case-insensitively and the decoded text is split at
/// the first `:`. Anything else, including a missing header, is `None`.
pub fn basic_credentials(req: &Request) -> Option<(String, String)> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_at_checked(6)?;
    if !scheme.eq_ignore_ascii_case("basic ") {
        return None;
    }
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Rejects requests that do not carry the expected credentials.
///
/// A rejected request gets `401` with a [`CHALLENGE`] header and a
/// [`DENIED`] body, and never reaches the wrapped handler. An accepted one
/// is passed on unchanged.
///
/// Rejections are logged at error level with the attempted username and
/// password. The password is redacted unless
/// [`log_passwords`](Auth::log_passwords) is turned on.
#[derive(Clone, Debug)]
pub struct Auth {
    credentials: Arc<Credentials>,
    log_passwords: bool,
    logger: Logger,
    metrics: Option<Arc<Metrics>>,
}

impl Auth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            log_passwords: false,
            logger: Logger::ambient(),
            metrics: None,
        }
    }

    /// Log attempted passwords verbatim on rejection.
    pub fn log_passwords(mut self, enabled: bool) -> Self {
        self.log_passwords = enabled;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Count rejections in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn shown<'a>(&self, password: &'a str) -> &'a str {
        if self.log_passwords || password.is_empty() {
            password
        } else {
            REDACTED
        }
    }

    fn reject(&self, username: &str, password: &str) -> Response {
        self.logger.emit(|| {
            error!(username = %username, password = %self.shown(password), "not authorized");
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_auth_failure();
        }
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(WWW_AUTHENTICATE.as_str(), CHALLENGE)
            .text(DENIED)
    }
}

impl Middleware for Auth {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let auth = self.clone();
        boxed(move |req: Request| {
            let next = Arc::clone(&next);
            let auth = auth.clone();
            async move {
                let Some((username, password)) = basic_credentials(&req) else {
                    return auth.reject("", "");
                };
                if !auth.credentials.matches(&username, &password) {
                    return auth.reject(&username, &password);
                }
                auth.logger.emit(|| info!(username = %username, "authorized"));
                next.call(req).await
            }
        })
    }
}
