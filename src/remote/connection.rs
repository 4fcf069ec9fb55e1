//! Redis Connection Module
//!
//! Builds the connection pool a Redis stash borrows from, and the command
//! helpers that run on a borrowed connection.

use deadpool_redis::Manager;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, Pipeline, RedisError, RedisResult};
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use crate::pool::{ConnectionPool, HealthCheck, PooledConnection};

/// Connection pool over multiplexed Redis connections.
pub type RedisPool = ConnectionPool<Manager>;
/// A connection borrowed from a [`RedisPool`].
pub type RedisConnection = PooledConnection<Manager>;

impl HealthCheck for Manager {
    async fn is_alive(&self, conn: &mut MultiplexedConnection) -> bool {
        let pong: RedisResult<String> = redis::cmd("PING").query_async(conn).await;
        pong.is_ok()
    }
}

/// Creates the pool for `config`. Connections are opened lazily on borrow.
pub fn connect(config: &ConnectionConfig) -> Result<RedisPool> {
    let manager = Manager::new(config.connection_info())?;
    info!(
        host = %config.host,
        port = config.port,
        auth = config.use_auth,
        "Creating Redis connection pool"
    );
    ConnectionPool::new(manager, config)
}

// == Commands ==
/// Runs one command on a borrowed connection, bounded by the borrow's deadline.
pub(crate) async fn query<V: FromRedisValue>(conn: &RedisConnection, cmd: &Cmd) -> Result<V> {
    let reply = conn
        .within_deadline(async {
            let mut handle = conn.lease().await?;
            let reply: RedisResult<V> = cmd.query_async(&mut *handle).await;
            Ok::<_, CacheError>(reply)
        })
        .await??;
    reply.map_err(|err| fault(conn, err))
}

/// Sends a pipeline on a borrowed connection in one round trip.
pub(crate) async fn query_pipelined<V: FromRedisValue>(
    conn: &RedisConnection,
    pipe: &Pipeline,
) -> Result<V> {
    let reply = conn
        .within_deadline(async {
            let mut handle = conn.lease().await?;
            let reply: RedisResult<V> = pipe.query_async(&mut *handle).await;
            Ok::<_, CacheError>(reply)
        })
        .await??;
    reply.map_err(|err| fault(conn, err))
}

fn fault(conn: &RedisConnection, err: RedisError) -> CacheError {
    if connection_lost(&err) {
        warn!(error = %err, "Redis connection lost, discarding it");
        conn.mark_dead();
    }
    err.into()
}

/// True for errors after which the connection cannot be reused.
fn connection_lost(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}
