//! Redis Stash Module
//!
//! Cache provider that keeps its elements in Redis.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::{CacheProvider, ExpiryPolicy};
use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use crate::pool::PoolStatus;
use crate::remote::connection::{connect, query, query_pipelined, RedisConnection, RedisPool};
use crate::remote::{Keyspace, ResultAdapter, ValueAdapter};

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 100;

// == Redis Stash ==
/// Redis-backed cache provider.
///
/// Each operation borrows one pooled connection and returns it when done,
/// including on error. Elements are written with the expiry policy as
/// their TTL.
pub struct RedisStash<K, T> {
    expiry: ExpiryPolicy,
    connection: ConnectionConfig,
    keyspace: Arc<Keyspace<K>>,
    result_adapter: ResultAdapter<T>,
    type_adapter: ValueAdapter<T>,
    pool: RedisPool,
}

impl<K, T> RedisStash<K, T>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates the stash and its connection pool.
    ///
    /// Must be called from within a Tokio runtime. No connection is opened
    /// until the first operation.
    pub fn new(
        expiry: ExpiryPolicy,
        connection: ConnectionConfig,
        keyspace: Keyspace<K>,
        result_adapter: ResultAdapter<T>,
        type_adapter: ValueAdapter<T>,
    ) -> Result<Self> {
        let pool = connect(&connection)?;

        debug!(
            prefix = keyspace.prefix(),
            ttl_secs = expiry.to_seconds(),
            "Redis stash created"
        );

        Ok(Self {
            expiry,
            connection,
            keyspace: Arc::new(keyspace),
            result_adapter,
            type_adapter,
            pool,
        })
    }

    pub fn keyspace(&self) -> &Keyspace<K> {
        &self.keyspace
    }

    pub fn expiry(&self) -> ExpiryPolicy {
        self.expiry
    }

    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    // == Helpers ==
    fn decode(&self, raw: Option<String>) -> Result<Option<T>> {
        match raw {
            Some(raw) if !raw.is_empty() => self.result_adapter.adapt(&raw).map(Some),
            _ => Ok(None),
        }
    }

    async fn get(&self, conn: &RedisConnection, head: &str) -> Result<Option<String>> {
        query(conn, redis::cmd("GET").arg(head)).await
    }

    async fn set_with_expiry(&self, conn: &RedisConnection, head: &str, value: &T) -> Result<()> {
        let encoded = self.type_adapter.adapt(value)?;
        query(
            conn,
            redis::cmd("SET")
                .arg(head)
                .arg(encoded)
                .arg("EX")
                .arg(self.expiry.remote_ttl()),
        )
        .await
    }

    /// Lists every remote key of this keyspace.
    async fn scan_keys(&self, conn: &RedisConnection) -> Result<Vec<String>> {
        let pattern = self.keyspace.select_all();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = query(
                conn,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT),
            )
            .await?;

            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may report a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

impl<K, T> CacheProvider<K, T> for RedisStash<K, T>
where
    K: Eq + Hash + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    async fn retrieve(&self, key: &K) -> Result<Option<T>> {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;
        let raw = self.get(&conn, &head).await?;
        drop(conn);

        let value = self.decode(raw)?;
        debug!(key = %head, hit = value.is_some(), "Redis stash retrieve");
        Ok(value)
    }

    async fn retrieve_or_set(&self, key: &K, value: T) -> Result<T> {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;

        if let Some(existing) = self.decode(self.get(&conn, &head).await?)? {
            return Ok(existing);
        }

        self.set_with_expiry(&conn, &head, &value).await?;
        Ok(value)
    }

    /// Fetches every element of the keyspace.
    ///
    /// A failure while fetching or decoding the values is logged and
    /// reported as an empty map, so callers cannot tell it apart from an
    /// empty keyspace. Failing to borrow or to list keys is returned as
    /// an error.
    async fn retrieve_all(&self) -> Result<HashMap<K, T>> {
        let conn = self.pool.borrow().await?;
        let keys = self.scan_keys(&conn).await?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let keyspace = self.keyspace.clone();
        let adapter = self.result_adapter.clone();
        let collect = tokio::spawn(async move {
            let values: Vec<Option<String>> = query(&conn, redis::cmd("MGET").arg(&keys)).await?;
            drop(conn);

            let mut results = HashMap::with_capacity(keys.len());
            for (remote, value) in keys.iter().zip(values) {
                let Some(value) = value.filter(|v| !v.is_empty()) else {
                    continue;
                };
                results.insert(keyspace.from_remote(remote)?, adapter.adapt(&value)?);
            }

            Ok::<_, CacheError>(results)
        });

        match collect.await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(err)) => {
                error!(error = %err, prefix = self.keyspace.prefix(), "Exception retrieving records");
                Ok(HashMap::new())
            }
            Err(err) => {
                error!(error = %err, prefix = self.keyspace.prefix(), "Record retrieval task failed");
                Ok(HashMap::new())
            }
        }
    }

    async fn store(&self, key: &K, value: T) -> Result<T> {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;
        self.set_with_expiry(&conn, &head, &value).await?;
        Ok(value)
    }

    async fn update(&self, key: &K, value: T) -> Result<T> {
        let head = self.keyspace.construct(key);
        let encoded = self.type_adapter.adapt(&value)?;
        let conn = self.pool.borrow().await?;

        // XX: only written when the key already exists
        let reply: Option<String> = query(
            &conn,
            redis::cmd("SET")
                .arg(&head)
                .arg(encoded)
                .arg("XX")
                .arg("EX")
                .arg(self.expiry.remote_ttl()),
        )
        .await?;

        match reply {
            Some(_) => Ok(value),
            None => Err(CacheError::MissingKey(head)),
        }
    }

    async fn evict(&self, key: &K) -> Result<bool> {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;
        let removed: i64 = query(&conn, redis::cmd("DEL").arg(&head)).await?;
        Ok(removed > 0)
    }

    async fn evict_value(&self, key: &K, expected: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;

        let Some(remote) = self.decode(self.get(&conn, &head).await?)? else {
            return Ok(false);
        };
        if remote != *expected {
            return Ok(false);
        }

        let removed: i64 = query(&conn, redis::cmd("DEL").arg(&head)).await?;
        Ok(removed > 0)
    }

    async fn evict_if<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&K, &T) -> bool + Send,
    {
        let all = self.retrieve_all().await?;
        let doomed: Vec<String> = all
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(key, _)| self.keyspace.construct(key))
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        for head in &doomed {
            pipe.cmd("DEL").arg(head);
        }

        let conn = self.pool.borrow().await?;
        let replies: Vec<i64> = query_pipelined(&conn, &pipe).await?;
        let removed = replies.iter().filter(|n| **n > 0).count();

        debug!(
            prefix = self.keyspace.prefix(),
            matched = doomed.len(),
            removed,
            "Redis stash evicted matching entries"
        );
        Ok(removed)
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        let head = self.keyspace.construct(key);
        let conn = self.pool.borrow().await?;
        query(&conn, redis::cmd("EXISTS").arg(&head)).await
    }

    fn close(&self) {
        self.pool.close();
    }
}

impl<K, T> fmt::Debug for RedisStash<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStash")
            .field("expiry", &self.expiry)
            .field("connection", &self.connection)
            .field("keyspace", &self.keyspace)
            .field("pool", &self.pool)
            .finish()
    }
}
