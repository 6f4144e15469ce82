//! Process configuration loaded from environment variables.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `GATEHOUSE_LISTEN` | `0.0.0.0:8080` | Listening socket |
//! | `GATEHOUSE_UPSTREAM` | `http://localhost:3000` | Forwarding target (`http` only) |
//! | `GATEHOUSE_AUTH` | `false` | Put basic auth in front of the proxy |
//! | `GATEHOUSE_AUTH_USER` | `user` | Expected username, non-empty |
//! | `GATEHOUSE_AUTH_PASSWORD` | `secret` | Expected password |
//! | `GATEHOUSE_LOG_PASSWORDS` | `false` | Log attempted passwords verbatim on auth failure |
//!
//! A `.env` file in the working directory is honoured by the binary.

use std::net::SocketAddr;

use crate::error::ConfigError;
use crate::middleware::auth::Credentials;
use crate::proxy::Upstream;

const LISTEN: &str = "GATEHOUSE_LISTEN";
const UPSTREAM: &str = "GATEHOUSE_UPSTREAM";
const AUTH: &str = "GATEHOUSE_AUTH";
const AUTH_USER: &str = "GATEHOUSE_AUTH_USER";
const AUTH_PASSWORD: &str = "GATEHOUSE_AUTH_PASSWORD";
const LOG_PASSWORDS: &str = "GATEHOUSE_LOG_PASSWORDS";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_UPSTREAM: &str = "http://localhost:3000";
const DEFAULT_USER: &str = "user";
const DEFAULT_PASSWORD: &str = "secret";

/// Process-wide, read-only configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Socket the server binds.
    pub listen: SocketAddr,

    /// Where non-instrumentation traffic is forwarded.
    pub upstream: Upstream,

    /// Expected basic-auth pair. `None` leaves the pipeline without auth.
    pub auth: Option<Credentials>,

    /// Log attempted passwords verbatim instead of redacting them.
    pub log_passwords: bool,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns the raw value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_raw = lookup(LISTEN).unwrap_or_else(|| DEFAULT_LISTEN.to_owned());
        let listen = listen_raw
            .parse()
            .map_err(|_| ConfigError::ListenAddr { var: LISTEN, value: listen_raw.clone() })?;

        let upstream_raw = lookup(UPSTREAM).unwrap_or_else(|| DEFAULT_UPSTREAM.to_owned());
        let upstream = upstream_raw.parse().map_err(|e: crate::proxy::InvalidUpstream| {
            ConfigError::Upstream { var: UPSTREAM, value: upstream_raw.clone(), reason: e.to_string() }
        })?;

        let auth = if flag(&lookup, AUTH)? {
            let username = lookup(AUTH_USER).unwrap_or_else(|| DEFAULT_USER.to_owned());
            if username.is_empty() {
                return Err(ConfigError::EmptyUsername { var: AUTH_USER });
            }
            Some(Credentials::new(
                username,
                lookup(AUTH_PASSWORD).unwrap_or_else(|| DEFAULT_PASSWORD.to_owned()),
            ))
        } else {
            None
        };

        Ok(Self {
            listen,
            upstream,
            auth,
            log_passwords: flag(&lookup, LOG_PASSWORDS)?,
        })
    }
}

/// Unset means `false`. Accepts the usual spellings, case-insensitively.
fn flag<F>(lookup: &F, var: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Bool { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_fixed_deployment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.upstream.to_string(), "http://localhost:3000/");
        assert!(config.auth.is_none());
        assert!(!config.log_passwords);
    }

    #[test]
    fn auth_flag_uses_default_credentials() {
        let config = load(&[(AUTH, "true")]).unwrap();
        let creds = config.auth.unwrap();
        assert_eq!(creds.username(), "user");
        assert!(creds.matches("user", "secret"));
    }

    #[test]
    fn auth_credentials_can_be_overridden() {
        let config = load(&[(AUTH, "on"), (AUTH_USER, "ops"), (AUTH_PASSWORD, "hunter2")]).unwrap();
        assert!(config.auth.unwrap().matches("ops", "hunter2"));
    }

    #[test]
    fn rejects_empty_username_with_auth_on() {
        let err = load(&[(AUTH, "true"), (AUTH_USER, ""), (AUTH_PASSWORD, "")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyUsername { var: AUTH_USER }));
    }

    #[test]
    fn credentials_without_the_flag_leave_auth_off() {
        let config = load(&[(AUTH_USER, "ops")]).unwrap();
        assert!(config.auth.is_none());
    }

    #[test]
    fn rejects_bad_listen_address() {
        let err = load(&[(LISTEN, ":8080")]).unwrap_err();
        assert!(matches!(err, ConfigError::ListenAddr { .. }));
    }

    #[test]
    fn rejects_tls_upstream() {
        let err = load(&[(UPSTREAM, "https://backend:443")]).unwrap_err();
        assert!(matches!(err, ConfigError::Upstream { .. }));
    }

    #[test]
    fn rejects_unknown_boolean() {
        let err = load(&[(LOG_PASSWORDS, "maybe")]).unwrap_err();
        assert!(err.to_string().contains("GATEHOUSE_LOG_PASSWORDS"));
    }
}
