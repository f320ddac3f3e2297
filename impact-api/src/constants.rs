//! Constants for the impact API
//!
//! Defaults for every environment-driven setting live here so they can be
//! found and tested in one place.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Prefix for versioned REST routes
pub const API_PREFIX: &str = "/api/v1";

/// Service name reported in traces and logs
pub const SERVICE_NAME: &str = "impact-api";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_DB_NAME: &str = "impact";
pub const DEFAULT_DB_USER: &str = "postgres";

/// Maximum pooled connections
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Wait/create/recycle timeout for pooled connections
pub const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CACHE
// ============================================================================

/// TTL applied to every metrics cache entry (24 hours)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Per-command Redis timeout
pub const DEFAULT_REDIS_COMMAND_TIMEOUT_MS: u64 = 500;

pub const DEFAULT_LMDB_PATH: &str = "./data/impact-cache";

/// LMDB map size
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

// ============================================================================
// BACKGROUND JOBS
// ============================================================================

/// How often the global metrics entry is refreshed (1 hour)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;
