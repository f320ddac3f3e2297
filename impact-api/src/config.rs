//! API Configuration Module
//!
//! Server binding, CORS and source-of-record selection. Configuration is
//! loaded from `IMPACT_*` environment variables with sensible defaults for
//! development. Every `from_env` has a `from_lookup` twin that takes the
//! variable source as a closure, so parsing can be tested without touching
//! the process environment.

use std::net::SocketAddr;
use std::str::FromStr;

use impact_core::ConfigError;

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT};

// ============================================================================
// ENVIRONMENT HELPERS
// ============================================================================

/// Read a variable from the process environment.
pub(crate) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse `key`, falling back to `default` when unset or malformed.
pub(crate) fn parse_or<T, L>(lookup: &L, key: &str, default: T) -> T
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Boolean flag: "true"/"1" and "false"/"0", case-insensitive.
pub(crate) fn flag_or<L>(lookup: &L, key: &str, default: bool) -> bool
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|value| value.trim().to_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP server and CORS configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface to bind.
    pub bind_host: String,

    /// Port to bind.
    pub port: u16,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://impact.run,https://app.impact.run"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `IMPACT_API_BIND`: Interface to bind (default: 0.0.0.0)
    /// - `PORT` or `IMPACT_API_PORT`: Port to bind (default: 3000)
    /// - `IMPACT_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `IMPACT_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `IMPACT_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    pub fn from_env() -> Self {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let cors_origins = lookup("IMPACT_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let port = lookup("PORT")
            .or_else(|| lookup("IMPACT_API_PORT"))
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Self {
            bind_host: lookup("IMPACT_API_BIND").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            port,
            cors_origins,
            cors_allow_credentials: flag_or(&lookup, "IMPACT_CORS_ALLOW_CREDENTIALS", false),
            cors_max_age_secs: parse_or(&lookup, "IMPACT_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS),
        }
    }

    /// Socket address the server should listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "IMPACT_API_BIND".to_string(),
                value: addr.clone(),
                reason: e.to_string(),
            })
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.impact.run
            match (allowed.strip_prefix("*."), origin.strip_prefix("https://")) {
                (Some(domain), Some(origin_host)) => {
                    origin_host == domain || origin_host.ends_with(&format!(".{}", domain))
                }
                _ => false,
            }
        })
    }
}

// ============================================================================
// SOURCE OF RECORD
// ============================================================================

/// Which metrics repository the server reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryBackend {
    /// Postgres aggregate functions.
    #[default]
    Postgres,
    /// In-process repository, starts with zeroed metrics. Development only.
    Memory,
}

impl RepositoryBackend {
    /// Read `IMPACT_REPOSITORY` ("postgres" or "memory").
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        match lookup("IMPACT_REPOSITORY") {
            None => Ok(Self::default()),
            Some(value) => value.parse(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for RepositoryBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "IMPACT_REPOSITORY".to_string(),
                value: other.to_string(),
                reason: "expected postgres or memory".to_string(),
            }),
        }
    }
}
