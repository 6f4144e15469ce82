//! Unified error types.

use thiserror::Error;

/// The error type returned by gatehouse's fallible operations.
///
/// Application-level outcomes (401, 502, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, reading configuration, or an
/// upstream exchange that never produced a response.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("upstream: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("http: {0}")]
    Http(#[from] http::Error),

    #[error("body: {0}")]
    Body(#[from] hyper::Error),
}

/// Rejected configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid listen address `{value}`")]
    ListenAddr { var: &'static str, value: String },

    #[error("{var}: invalid upstream `{value}`: {reason}")]
    Upstream {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var}: must not be empty when basic auth is on")]
    EmptyUsername { var: &'static str },

    #[error("{var}: expected a boolean, got `{value}`")]
    Bool { var: &'static str, value: String },
}
