// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! All settings are read once at startup into a [`Config`] value that is
//! passed to every component. Nothing reads the environment afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_PROXY_HOST` | Gateway bind address | `127.0.0.1` |
//! | `AUTH_PROXY_PORT` | Gateway bind port | `5985` |
//! | `COUCHDB_URL` | Backend base URL | `http://{COUCHDB_HOST}:{COUCHDB_PORT}` |
//! | `COUCHDB_HOST` | Backend host (when `COUCHDB_URL` unset) | `127.0.0.1` |
//! | `COUCHDB_PORT` | Backend port (when `COUCHDB_URL` unset) | `5984` |
//! | `COUCHDB_USER` | Backend Basic-auth user | `admin` |
//! | `COUCHDB_PASSWORD` | Backend Basic-auth password | Required |
//! | `JWT_HMAC_SECRET` | HS256 secret for device credentials | Required |
//! | `ADMIN_TOKEN` | Operator secret for `/admin` | Unset disables admin API |
//! | `TOKEN_DB_PATH` | Token database file | `tokens.redb` |
//! | `UPSTREAM_TIMEOUT_SECS` | Backend request timeout | `300` |
//! | `CLEANUP_INTERVAL_SECS` | Expired-token sweep period (`0` = off) | `0` |
//! | `PUBLIC_URL` | Public base URL written into setup URIs | `https://obsidian.example.com` |
//! | `SETUP_PATH_PREFIX` | Reverse-proxy path prefix for setup URIs | `obsidian` |
//! | `SYNC_USER` | Username written into setup URIs | `obsidian` |
//! | `DB_NAME` | Database name written into setup URIs | `obsidian-sync` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

pub const HOST_ENV: &str = "AUTH_PROXY_HOST";
pub const PORT_ENV: &str = "AUTH_PROXY_PORT";
pub const COUCHDB_URL_ENV: &str = "COUCHDB_URL";
pub const COUCHDB_HOST_ENV: &str = "COUCHDB_HOST";
pub const COUCHDB_PORT_ENV: &str = "COUCHDB_PORT";
pub const COUCHDB_USER_ENV: &str = "COUCHDB_USER";
pub const COUCHDB_PASSWORD_ENV: &str = "COUCHDB_PASSWORD";
pub const JWT_SECRET_ENV: &str = "JWT_HMAC_SECRET";
pub const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";
pub const TOKEN_DB_PATH_ENV: &str = "TOKEN_DB_PATH";
pub const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_SECS";
pub const CLEANUP_INTERVAL_ENV: &str = "CLEANUP_INTERVAL_SECS";
pub const PUBLIC_URL_ENV: &str = "PUBLIC_URL";
pub const SETUP_PATH_PREFIX_ENV: &str = "SETUP_PATH_PREFIX";
pub const SYNC_USER_ENV: &str = "SYNC_USER";
pub const DB_NAME_ENV: &str = "DB_NAME";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default backend timeout; bulk replication can take minutes.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// The CouchDB peer every authenticated request is relayed to.
#[derive(Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub user: String,
    pub password: String,
}

impl BackendConfig {
    /// Backend URL for a request path (with leading `/`) and optional raw query.
    ///
    /// The result is parsed as a URL before sending, so dot-segments
    /// (`.`, `..`, `%2e%2e`) are resolved and never reach the backend.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.url.as_str().trim_end_matches('/');
        match query {
            Some(q) if !q.is_empty() => format!("{base}{path}?{q}"),
            _ => format!("{base}{path}"),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection values written into generated setup URIs.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub public_url: String,
    pub path_prefix: String,
    pub sync_user: String,
    pub db_name: String,
}

impl SetupConfig {
    /// `couchDB_URI` as seen by clients: the public URL under the proxy prefix.
    pub fn couchdb_uri(&self) -> String {
        let base = self.public_url.trim_end_matches('/');
        let prefix = self.path_prefix.trim_matches('/');
        if prefix.is_empty() || base.ends_with(&format!("/{prefix}")) {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }

    /// `couchDB_DBNAME` as seen by clients.
    pub fn couchdb_dbname(&self) -> String {
        let prefix = self.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            self.db_name.clone()
        } else {
            format!("{prefix}/{}", self.db_name)
        }
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            public_url: "https://obsidian.example.com".to_string(),
            path_prefix: "obsidian".to_string(),
            sync_user: "obsidian".to_string(),
            db_name: "obsidian-sync".to_string(),
        }
    }
}

/// Complete gateway configuration.
#[derive(Clone)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub backend: BackendConfig,
    pub jwt_secret: String,
    pub admin_token: Option<String>,
    pub token_db_path: PathBuf,
    pub upstream_timeout: Duration,
    pub cleanup_interval: Option<Duration>,
    pub setup: SetupConfig,
    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_host", &self.listen_host)
            .field("listen_port", &self.listen_port)
            .field("backend", &self.backend)
            .field("jwt_secret", &"<redacted>")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("token_db_path", &self.token_db_path)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("setup", &self.setup)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let listen_host = or_default(HOST_ENV, "127.0.0.1");
        let listen_port = parse_var(PORT_ENV, get(PORT_ENV), 5985u16)?;

        let backend_url = match get(COUCHDB_URL_ENV) {
            Some(url) => url,
            None => format!(
                "http://{}:{}",
                or_default(COUCHDB_HOST_ENV, "127.0.0.1"),
                or_default(COUCHDB_PORT_ENV, "5984")
            ),
        };
        let backend_url = Url::parse(&backend_url).map_err(|e| ConfigError::Invalid {
            var: COUCHDB_URL_ENV,
            reason: e.to_string(),
        })?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                var: COUCHDB_URL_ENV,
                reason: format!("unsupported scheme '{}'", backend_url.scheme()),
            });
        }

        let backend = BackendConfig {
            url: backend_url,
            user: or_default(COUCHDB_USER_ENV, "admin"),
            password: get(COUCHDB_PASSWORD_ENV)
                .ok_or(ConfigError::Missing(COUCHDB_PASSWORD_ENV))?,
        };

        let jwt_secret = get(JWT_SECRET_ENV).ok_or(ConfigError::Missing(JWT_SECRET_ENV))?;

        let upstream_timeout = Duration::from_secs(parse_var(
            UPSTREAM_TIMEOUT_ENV,
            get(UPSTREAM_TIMEOUT_ENV),
            DEFAULT_UPSTREAM_TIMEOUT.as_secs(),
        )?);
        if upstream_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: UPSTREAM_TIMEOUT_ENV,
                reason: "must be greater than zero".to_string(),
            });
        }

        let cleanup_secs: u64 = parse_var(CLEANUP_INTERVAL_ENV, get(CLEANUP_INTERVAL_ENV), 0)?;
        let cleanup_interval = (cleanup_secs > 0).then(|| Duration::from_secs(cleanup_secs));

        let defaults = SetupConfig::default();
        let setup = SetupConfig {
            public_url: get(PUBLIC_URL_ENV).unwrap_or(defaults.public_url),
            path_prefix: lookup(SETUP_PATH_PREFIX_ENV).unwrap_or(defaults.path_prefix),
            sync_user: get(SYNC_USER_ENV).unwrap_or(defaults.sync_user),
            db_name: get(DB_NAME_ENV).unwrap_or(defaults.db_name),
        };

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(value) => value.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            listen_host,
            listen_port,
            backend,
            jwt_secret,
            admin_token: get(ADMIN_TOKEN_ENV),
            token_db_path: PathBuf::from(or_default(TOKEN_DB_PATH_ENV, "tokens.redb")),
            upstream_timeout,
            cleanup_interval,
            setup,
            log_format,
        })
    }

    /// `host:port` the gateway listens on.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

fn parse_var<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        (COUCHDB_PASSWORD_ENV, "couch-pass"),
        (JWT_SECRET_ENV, "jwt-secret"),
    ];

    #[test]
    fn defaults_apply_when_only_secrets_are_set() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:5985");
        assert_eq!(config.backend.url.as_str(), "http://127.0.0.1:5984/");
        assert_eq!(config.backend.user, "admin");
        assert!(config.admin_token.is_none());
        assert_eq!(config.upstream_timeout, DEFAULT_UPSTREAM_TIMEOUT);
        assert!(config.cleanup_interval.is_none());
        assert_eq!(config.token_db_path, PathBuf::from("tokens.redb"));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn missing_secrets_are_reported() {
        let err = Config::from_lookup(lookup_from(&[(JWT_SECRET_ENV, "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(COUCHDB_PASSWORD_ENV)));

        let err = Config::from_lookup(lookup_from(&[(COUCHDB_PASSWORD_ENV, "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(JWT_SECRET_ENV)));
    }

    #[test]
    fn backend_url_composed_from_host_and_port() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((COUCHDB_HOST_ENV, "couchdb"));
        pairs.push((COUCHDB_PORT_ENV, "6984"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.backend.url.as_str(), "http://couchdb:6984/");
    }

    #[test]
    fn empty_admin_token_disables_admin() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((ADMIN_TOKEN_ENV, ""));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((PORT_ENV, "not-a-port"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: PORT_ENV, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push((COUCHDB_URL_ENV, "ftp://example.com"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: COUCHDB_URL_ENV, .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push((LOG_FORMAT_ENV, "xml"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { var: LOG_FORMAT_ENV, .. })
        ));
    }

    #[test]
    fn cleanup_interval_enabled_when_positive() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((CLEANUP_INTERVAL_ENV, "3600"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.cleanup_interval, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn target_url_keeps_path_and_query() {
        let backend = BackendConfig {
            url: Url::parse("http://127.0.0.1:5984").unwrap(),
            user: "admin".to_string(),
            password: "pw".to_string(),
        };
        assert_eq!(
            backend.target_url("/db/_changes", Some("since=now&feed=longpoll")),
            "http://127.0.0.1:5984/db/_changes?since=now&feed=longpoll"
        );
        assert_eq!(backend.target_url("/", None), "http://127.0.0.1:5984/");
    }

    #[test]
    fn setup_uri_appends_prefix_once() {
        let mut setup = SetupConfig::default();
        assert_eq!(setup.couchdb_uri(), "https://obsidian.example.com/obsidian");
        assert_eq!(setup.couchdb_dbname(), "obsidian/obsidian-sync");

        setup.public_url = "https://sync.example.org/obsidian/".to_string();
        assert_eq!(setup.couchdb_uri(), "https://sync.example.org/obsidian");

        setup.path_prefix = String::new();
        setup.public_url = "https://couch.example.org".to_string();
        assert_eq!(setup.couchdb_uri(), "https://couch.example.org");
        assert_eq!(setup.couchdb_dbname(), "obsidian-sync");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push((ADMIN_TOKEN_ENV, "operator-secret"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("couch-pass"));
        assert!(!rendered.contains("jwt-secret"));
        assert!(!rendered.contains("operator-secret"));
    }
}
