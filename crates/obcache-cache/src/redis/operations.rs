//! Redis command implementations.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use obcache_core::error::{AppError, ErrorKind};
use obcache_core::result::AppResult;

use crate::remote::connection::RemoteConnection;

/// Live Redis connection.
///
/// The underlying [`ConnectionManager`] reconnects on its own; failed
/// commands surface as [`ErrorKind::Connection`] until it does.
#[derive(Clone)]
pub struct RedisConnection {
    conn: ConnectionManager,
}

impl RedisConnection {
    /// Wrap an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conn_mut(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        let kind = if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
            ErrorKind::Connection
        } else {
            ErrorKind::Cache
        };
        AppError::with_source(kind, format!("Redis error: {e}"), e)
    }
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteConnection for RedisConnection {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn_mut();
        let result: Option<String> = conn.get(key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn_mut();
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.conn_mut();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let _: bool = conn.expire(key, ttl).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn flush(&self) -> AppResult<()> {
        let mut conn = self.conn_mut();
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn size(&self) -> AppResult<u64> {
        let mut conn = self.conn_mut();
        let size: u64 = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(size)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(AppError::connection(format!("Unexpected PING reply: {pong}")))
        }
    }
}
