//! LMDB-backed cache client.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep a persistent,
//! memory-mapped local cache that survives process restarts.
//!
//! # Value Layout
//!
//! `[expires_at_millis: i64 LE][payload]`
//!
//! Expiry is checked on read. Expired entries read as absent and are deleted;
//! [`LmdbCacheClient::purge_expired`] sweeps the whole database.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The client uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, expiry deletes and purges
//! - Statistics are tracked with atomic counters

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use impact_core::CacheError;

use super::traits::CacheClient;

const HEADER_LEN: usize = 8;

/// Error type for opening an LMDB cache.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Io(io) => CacheError::Io {
                reason: io.to_string(),
            },
            other => CacheError::Connection {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> CacheError {
    CacheError::Transaction {
        reason: e.to_string(),
    }
}

/// LMDB-backed cache client.
///
/// # Example
///
/// ```ignore
/// let cache = LmdbCacheClient::new("/var/lib/impact/cache", 64)?;
/// cache.set("global:metrics", &bytes, Duration::from_secs(86_400)).await?;
/// ```
pub struct LmdbCacheClient {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Entries found expired on read.
    expired_reads: AtomicU64,
    /// Entries removed by `purge_expired`.
    purged: AtomicU64,
}

impl LmdbCacheClient {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            expired_reads: AtomicU64::new(0),
            purged: AtomicU64::new(0),
        })
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn entry_count(&self) -> Result<u64, CacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    /// Entries found expired on read so far.
    pub fn expired_reads(&self) -> u64 {
        self.expired_reads.load(Ordering::Relaxed)
    }

    /// Entries removed by sweeps so far.
    pub fn purged_total(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Utc::now().timestamp_millis();

        let expired_keys = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            let mut keys = Vec::new();
            for result in self.db.iter(&rtxn).map_err(txn_error)? {
                let (key, value) = result.map_err(txn_error)?;
                if is_expired(value, now) {
                    keys.push(key.to_vec());
                }
            }
            keys
        };

        if expired_keys.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &expired_keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        self.purged.fetch_add(deleted, Ordering::Relaxed);
        Ok(deleted)
    }

    /// Remove `key` if it is still expired at `now`.
    fn delete_if_expired(&self, key: &[u8], now: i64) -> Result<(), CacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let still_expired = self
            .db
            .get(&wtxn, key)
            .map_err(txn_error)?
            .is_some_and(|value| is_expired(value, now));
        if still_expired {
            self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)
    }
}

#[async_trait]
impl CacheClient for LmdbCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Utc::now().timestamp_millis();

        let stored = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            self.db
                .get(&rtxn, key.as_bytes())
                .map_err(txn_error)?
                .map(|bytes| bytes.to_vec())
        };

        let Some(bytes) = stored else {
            return Ok(None);
        };

        let Some(expires_at) = read_expiry(&bytes) else {
            return Err(CacheError::Deserialization {
                key: key.to_string(),
                reason: format!("entry shorter than {HEADER_LEN}-byte header"),
            });
        };

        if expires_at <= now {
            self.expired_reads.fetch_add(1, Ordering::Relaxed);
            self.delete_if_expired(key.as_bytes(), now)?;
            return Ok(None);
        }

        Ok(Some(bytes[HEADER_LEN..].to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_millis);

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + value.len());
        full_bytes.extend_from_slice(&expires_at.to_le_bytes());
        full_bytes.extend_from_slice(value);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &full_bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}

fn read_expiry(bytes: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

fn is_expired(bytes: &[u8], now: i64) -> bool {
    read_expiry(bytes).map_or(true, |expires_at| expires_at <= now)
}
