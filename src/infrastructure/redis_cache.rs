//! Redis-backed cache.
//!
//! Lets several application instances share view counters, block flags,
//! suppression flags and cached resolutions.
//!
//! ## Command mapping
//!
//! - `get` → `GET`
//! - `set` → `SET key value EX ttl`
//! - `add` → `SET key value NX EX ttl`
//! - `incr` → `MULTI; SET key 0 NX EX ttl; INCR key; EXEC`, so a fresh
//!   counter gets its expiry in the same transaction that creates it and
//!   later increments leave the expiry alone
//! - `delete` → `DEL`
//!
//! Sub-second TTLs are rounded up to one second.
//!
//! ## Runtime
//!
//! The `Cache` port is synchronous. Inside a multi-threaded tokio runtime
//! each call runs through `block_in_place`; outside any runtime a small
//! current-thread runtime is created for the call. Calling from a
//! current-thread runtime is not supported.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ads_throttle::{AdsThrottle, RedisCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = RedisCache::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let engine = AdsThrottle::builder()
//!         .with_cache(Arc::new(cache))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{Cache, CacheError};
use redis::aio::ConnectionManager;
use redis::{Client, ErrorKind, RedisError};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Redis implementation of the `Cache` port.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    fn run<T, F>(&self, key: &str, operation: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        let result = if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(operation))
        } else {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| CacheError::Unavailable(format!("failed to start runtime: {}", e)))?;
            runtime.block_on(operation)
        };
        result.map_err(|e| map_error(key, e))
    }
}

fn map_error(key: &str, error: RedisError) -> CacheError {
    match error.kind() {
        ErrorKind::TypeError => CacheError::Codec(error.to_string()),
        ErrorKind::ResponseError if error.to_string().contains("not an integer") => {
            CacheError::NotACounter(key.to_string())
        }
        _ => CacheError::Unavailable(error.to_string()),
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs.max(1)
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection.clone();
        self.run(key, async move {
            let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        self.run(key, async move {
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }

    fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.connection.clone();
        self.run(key, async move {
            // Nil reply means the key already existed
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut conn = self.connection.clone();
        self.run(key, async move {
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(key)
                .arg(0)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs(ttl))
                .ignore()
                .cmd("INCR")
                .arg(key)
                .query_async(&mut conn)
                .await?;
            Ok(count)
        })
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        self.run(key, async move {
            let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_up() {
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(ttl_secs(Duration::MAX), u64::MAX);
    }
}
