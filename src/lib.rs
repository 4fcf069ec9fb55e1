//! Stash - typed key-value caching over Redis or process memory
//!
//! Application code talks to a [`CacheProvider`]; the backend is either an
//! in-memory [`MemoryStash`] or a [`RedisStash`] that borrows connections
//! from a leak-reaping pool.
//!
//! ```
//! use stash::{Backend, CacheProvider, ExpiryPolicy, StashBuilder, TimeUnit};
//!
//! # tokio_test::block_on(async {
//! let stash = StashBuilder::<String, i64>::new(Backend::Memory)
//!     .with_expiry(ExpiryPolicy::of(20, TimeUnit::Seconds))
//!     .build()
//!     .unwrap();
//!
//! stash.store(&"answer".to_string(), 42).await.unwrap();
//! assert_eq!(stash.retrieve(&"answer".to_string()).await.unwrap(), Some(42));
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod pool;
pub mod remote;
pub mod tasks;

pub use cache::{CacheProvider, ExpiryPolicy, MemoryStash, TimeUnit};
pub use config::ConnectionConfig;
pub use error::{CacheError, Result};
pub use factory::{Backend, RedisStashConfig, Stash, StashBuilder, StashConfig};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use remote::{Keyspace, RedisStash, ResultAdapter, TypeAdapter, ValueAdapter};
