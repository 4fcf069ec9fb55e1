//! Stash Factory Module
//!
//! Assembles a configured cache provider for either backend.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::cache::{CacheProvider, ExpiryPolicy, MemoryStash};
use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use crate::remote::{Keyspace, RedisStash, ResultAdapter, ValueAdapter};

// == Backend ==
/// Where a stash keeps its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Redis,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Redis => write!(f, "redis"),
        }
    }
}

// == Configurations ==
/// Everything a Redis-backed stash is built from.
pub struct RedisStashConfig<K, T> {
    pub expiry: ExpiryPolicy,
    pub connection: ConnectionConfig,
    pub keyspace: Keyspace<K>,
    pub result_adapter: ResultAdapter<T>,
    pub type_adapter: ValueAdapter<T>,
}

/// Complete configuration of a stash, one variant per backend.
pub enum StashConfig<K, T> {
    Memory { expiry: ExpiryPolicy },
    Redis(RedisStashConfig<K, T>),
}

impl<K, T> StashConfig<K, T> {
    pub fn backend(&self) -> Backend {
        match self {
            StashConfig::Memory { .. } => Backend::Memory,
            StashConfig::Redis(_) => Backend::Redis,
        }
    }
}

// == Stash ==
/// A cache provider of either backend.
#[derive(Debug)]
pub enum Stash<K, T> {
    Memory(MemoryStash<K, T>),
    Redis(RedisStash<K, T>),
}

impl<K, T> Stash<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    // == Build ==
    /// Builds the provider described by `config`.
    ///
    /// Building a Redis stash must happen within a Tokio runtime.
    pub fn build(config: StashConfig<K, T>) -> Result<Self> {
        match config {
            StashConfig::Memory { expiry } => Ok(Stash::Memory(MemoryStash::new(expiry))),
            StashConfig::Redis(config) => Ok(Stash::Redis(RedisStash::new(
                config.expiry,
                config.connection,
                config.keyspace,
                config.result_adapter,
                config.type_adapter,
            )?)),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Stash::Memory(_) => Backend::Memory,
            Stash::Redis(_) => Backend::Redis,
        }
    }
}

impl<K, T> CacheProvider<K, T> for Stash<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn retrieve(&self, key: &K) -> Result<Option<T>> {
        match self {
            Stash::Memory(stash) => stash.retrieve(key).await,
            Stash::Redis(stash) => stash.retrieve(key).await,
        }
    }

    async fn retrieve_or_set(&self, key: &K, value: T) -> Result<T> {
        match self {
            Stash::Memory(stash) => stash.retrieve_or_set(key, value).await,
            Stash::Redis(stash) => stash.retrieve_or_set(key, value).await,
        }
    }

    async fn retrieve_all(&self) -> Result<HashMap<K, T>> {
        match self {
            Stash::Memory(stash) => stash.retrieve_all().await,
            Stash::Redis(stash) => stash.retrieve_all().await,
        }
    }

    async fn store(&self, key: &K, value: T) -> Result<T> {
        match self {
            Stash::Memory(stash) => stash.store(key, value).await,
            Stash::Redis(stash) => stash.store(key, value).await,
        }
    }

    async fn update(&self, key: &K, value: T) -> Result<T> {
        match self {
            Stash::Memory(stash) => stash.update(key, value).await,
            Stash::Redis(stash) => stash.update(key, value).await,
        }
    }

    async fn evict(&self, key: &K) -> Result<bool> {
        match self {
            Stash::Memory(stash) => stash.evict(key).await,
            Stash::Redis(stash) => stash.evict(key).await,
        }
    }

    async fn evict_value(&self, key: &K, expected: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        match self {
            Stash::Memory(stash) => stash.evict_value(key, expected).await,
            Stash::Redis(stash) => stash.evict_value(key, expected).await,
        }
    }

    async fn evict_if<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&K, &T) -> bool + Send,
    {
        match self {
            Stash::Memory(stash) => stash.evict_if(predicate).await,
            Stash::Redis(stash) => stash.evict_if(predicate).await,
        }
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        match self {
            Stash::Memory(stash) => stash.contains(key).await,
            Stash::Redis(stash) => stash.contains(key).await,
        }
    }

    fn close(&self) {
        match self {
            Stash::Memory(stash) => stash.close(),
            Stash::Redis(stash) => stash.close(),
        }
    }
}

// == Stash Builder ==
/// Step-by-step assembly of a [`StashConfig`].
///
/// Redis-only options are rejected as soon as they are given to a memory
/// builder; missing options are reported by [`build`](StashBuilder::build).
pub struct StashBuilder<K, T> {
    backend: Backend,
    expiry: Option<ExpiryPolicy>,
    connection: Option<ConnectionConfig>,
    keyspace: Option<Keyspace<K>>,
    result_adapter: Option<ResultAdapter<T>>,
    type_adapter: Option<ValueAdapter<T>>,
}

impl<K, T> StashBuilder<K, T> {
    // == Constructor ==
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            expiry: None,
            connection: None,
            keyspace: None,
            result_adapter: None,
            type_adapter: None,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    // == Options ==
    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Result<Self> {
        self.require_redis("connection")?;
        self.connection = Some(connection);
        Ok(self)
    }

    pub fn with_keyspace(mut self, keyspace: Keyspace<K>) -> Result<Self> {
        self.require_redis("keyspace")?;
        self.keyspace = Some(keyspace);
        Ok(self)
    }

    pub fn with_result_adapter(mut self, adapter: ResultAdapter<T>) -> Result<Self> {
        self.require_redis("result adapter")?;
        self.result_adapter = Some(adapter);
        Ok(self)
    }

    pub fn with_type_adapter(mut self, adapter: ValueAdapter<T>) -> Result<Self> {
        self.require_redis("type adapter")?;
        self.type_adapter = Some(adapter);
        Ok(self)
    }

    fn require_redis(&self, option: &str) -> Result<()> {
        if self.backend != Backend::Redis {
            return Err(CacheError::Configuration(format!(
                "cannot assign {} to a {} stash",
                option, self.backend
            )));
        }
        Ok(())
    }

    // == Config ==
    /// Checks that every option the backend needs is present.
    pub fn config(self) -> Result<StashConfig<K, T>> {
        let expiry = self.expiry.ok_or_else(|| missing("expiry policy"))?;

        match self.backend {
            Backend::Memory => Ok(StashConfig::Memory { expiry }),
            Backend::Redis => Ok(StashConfig::Redis(RedisStashConfig {
                expiry,
                connection: self.connection.ok_or_else(|| missing("connection"))?,
                keyspace: self.keyspace.ok_or_else(|| missing("keyspace"))?,
                result_adapter: self
                    .result_adapter
                    .ok_or_else(|| missing("result adapter"))?,
                type_adapter: self.type_adapter.ok_or_else(|| missing("type adapter"))?,
            })),
        }
    }
}

impl<K, T> StashBuilder<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    // == Build ==
    pub fn build(self) -> Result<Stash<K, T>> {
        Stash::build(self.config()?)
    }
}

fn missing(option: &str) -> CacheError {
    CacheError::Configuration(format!("missing {} for stash", option))
}
