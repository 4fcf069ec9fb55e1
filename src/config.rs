//! Configuration Module
//!
//! Connection and pool parameters for the Redis backend.

use std::env;
use std::fmt;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;
/// Default socket connect timeout in milliseconds
pub const CONNECT_TIMEOUT_MS: u64 = 2000;
/// Default lifetime of a borrowed connection before the auditor reclaims it
pub const RESOURCE_TIMEOUT_MS: u64 = 20_000;
/// Default time to wait for a free pooled connection
pub const BORROW_WAIT_MS: u64 = 1500;
/// Default maximum number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 256;

/// Connection and pool parameters for one Redis-backed provider.
///
/// Immutable once handed to a provider. Values can be loaded from
/// environment variables with [`ConnectionConfig::from_env`].
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Redis host name or address
    pub host: String,
    /// Redis port
    pub port: u16,
    /// Whether to authenticate with `password`
    pub use_auth: bool,
    /// Password sent when `use_auth` is set
    pub password: Option<String>,
    /// Separator between a keyspace prefix and the encoded key
    pub delimiter: String,
    /// Maximum number of connections held by the pool
    pub pool_size: usize,
    /// Socket connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Borrow lifetime in milliseconds before a connection counts as leaked
    pub resource_timeout_ms: u64,
    /// Maximum time in milliseconds to wait for a free connection
    pub borrow_wait_ms: u64,
    /// Ping each connection as it is borrowed
    pub test_on_borrow: bool,
    /// Wait up to `borrow_wait_ms` when the pool is exhausted instead of failing at once
    pub block_when_exhausted: bool,
}

impl ConnectionConfig {
    // == Constructor ==
    /// Creates a config for the given server, with defaults for every pool setting.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        use_auth: bool,
        password: Option<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            use_auth,
            password,
            ..Self::default()
        }
    }

    /// Creates a new ConnectionConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STASH_REDIS_HOST` - Redis host (default: 127.0.0.1)
    /// - `STASH_REDIS_PORT` - Redis port (default: 6379)
    /// - `STASH_REDIS_PASSWORD` - Password; enables auth when set
    /// - `STASH_REDIS_DELIMITER` - Keyspace delimiter (default: ".")
    /// - `STASH_POOL_SIZE` - Maximum pooled connections (default: 256)
    /// - `STASH_CONNECT_TIMEOUT_MS` - Connect timeout (default: 2000)
    /// - `STASH_RESOURCE_TIMEOUT_MS` - Leak deadline (default: 20000)
    /// - `STASH_BORROW_WAIT_MS` - Borrow wait (default: 1500)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let password = env::var("STASH_REDIS_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        Self {
            host: env::var("STASH_REDIS_HOST").unwrap_or(defaults.host),
            port: parse_env("STASH_REDIS_PORT", defaults.port),
            use_auth: password.is_some(),
            password,
            delimiter: env::var("STASH_REDIS_DELIMITER").unwrap_or(defaults.delimiter),
            pool_size: parse_env("STASH_POOL_SIZE", defaults.pool_size),
            connect_timeout_ms: parse_env("STASH_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            resource_timeout_ms: parse_env(
                "STASH_RESOURCE_TIMEOUT_MS",
                defaults.resource_timeout_ms,
            ),
            borrow_wait_ms: parse_env("STASH_BORROW_WAIT_MS", defaults.borrow_wait_ms),
            test_on_borrow: defaults.test_on_borrow,
            block_when_exhausted: defaults.block_when_exhausted,
        }
    }

    // == Setters ==
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.connect_timeout_ms = timeout;
        self
    }

    pub fn with_resource_timeout_ms(mut self, timeout: u64) -> Self {
        self.resource_timeout_ms = timeout;
        self
    }

    pub fn with_borrow_wait_ms(mut self, wait: u64) -> Self {
        self.borrow_wait_ms = wait;
        self
    }

    pub fn with_test_on_borrow(mut self, test_on_borrow: bool) -> Self {
        self.test_on_borrow = test_on_borrow;
        self
    }

    pub fn with_block_when_exhausted(mut self, block: bool) -> Self {
        self.block_when_exhausted = block;
        self
    }

    // == Durations ==
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_millis(self.resource_timeout_ms)
    }

    /// Time a borrower may wait for a free connection.
    ///
    /// Zero when the pool should fail immediately on exhaustion.
    pub fn borrow_wait(&self) -> Duration {
        if self.block_when_exhausted {
            Duration::from_millis(self.borrow_wait_ms)
        } else {
            Duration::ZERO
        }
    }

    // == Connection Info ==
    /// Builds the client connection descriptor for this server.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                password: if self.use_auth {
                    self.password.clone()
                } else {
                    None
                },
                ..Default::default()
            },
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            use_auth: false,
            password: None,
            delimiter: ".".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            resource_timeout_ms: RESOURCE_TIMEOUT_MS,
            borrow_wait_ms: BORROW_WAIT_MS,
            test_on_borrow: true,
            block_when_exhausted: true,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_auth", &self.use_auth)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("delimiter", &self.delimiter)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("resource_timeout_ms", &self.resource_timeout_ms)
            .field("borrow_wait_ms", &self.borrow_wait_ms)
            .field("test_on_borrow", &self.test_on_borrow)
            .field("block_when_exhausted", &self.block_when_exhausted)
            .finish()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
